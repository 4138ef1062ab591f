//! The relax data store: all data pipes of a session, the current pipe and
//! the pipe bundles.

pub mod spin_tree;

use crate::core::error::{RelaxError, Result};
use crate::core::io::xml::{PyValue, XmlElement, XmlObject, fill_object_contents, xml_to_object};
use crate::core::models::pipe::{PipeContainer, PipeType};
use crate::core::utils::time;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::sync::Mutex;
use tracing::{debug, info};

pub use spin_tree::{SpinMut, SpinView};

/// The namespace of relax state files.
pub const RELAX_NAMESPACE: &str = "http://www.nmr-relax.com";
/// The version of the state file layout written.
pub const FILE_VERSION: &str = "2";

static STORE: Lazy<Mutex<DataStore>> = Lazy::new(|| Mutex::new(DataStore::new()));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataStore {
    pipes: BTreeMap<String, PipeContainer>,
    current_pipe: Option<String>,
    pipe_bundles: BTreeMap<String, Vec<String>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process wide data store.
    pub fn global() -> &'static Mutex<DataStore> {
        &STORE
    }

    /// Adds a new data pipe, optionally to a bundle, and by default makes it
    /// the current pipe.
    pub fn add(&mut self, pipe_name: &str, pipe_type: &str, bundle: Option<&str>, switch: bool) -> Result<()> {
        if self.pipes.contains_key(pipe_name) {
            return Err(RelaxError::Pipe(pipe_name.to_string()));
        }
        let pipe_type: PipeType = pipe_type.parse()?;
        self.pipes
            .insert(pipe_name.to_string(), PipeContainer::new(pipe_type));

        if let Some(bundle) = bundle {
            self.pipe_bundles
                .entry(bundle.to_string())
                .or_default()
                .push(pipe_name.to_string());
        }
        if switch {
            self.current_pipe = Some(pipe_name.to_string());
        }
        debug!(pipe = pipe_name, %pipe_type, "Added a data pipe");
        Ok(())
    }

    pub fn has_pipe(&self, name: &str) -> bool {
        self.pipes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&PipeContainer> {
        self.pipes
            .get(name)
            .ok_or_else(|| RelaxError::NoPipe(name.to_string()))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut PipeContainer> {
        self.pipes
            .get_mut(name)
            .ok_or_else(|| RelaxError::NoPipe(name.to_string()))
    }

    pub fn current_name(&self) -> Option<&str> {
        self.current_pipe.as_deref()
    }

    pub fn current(&self) -> Result<&PipeContainer> {
        let name = self.current_pipe.as_deref().ok_or(RelaxError::NoCurrentPipe)?;
        self.get(name)
    }

    pub fn current_mut(&mut self) -> Result<&mut PipeContainer> {
        let name = self.current_pipe.clone().ok_or(RelaxError::NoCurrentPipe)?;
        self.get_mut(&name)
    }

    pub fn switch(&mut self, name: &str) -> Result<()> {
        if !self.pipes.contains_key(name) {
            return Err(RelaxError::NoPipe(name.to_string()));
        }
        self.current_pipe = Some(name.to_string());
        Ok(())
    }

    /// Deletes a pipe, removing it from its bundle. Deleting the current pipe
    /// leaves no pipe current.
    pub fn delete(&mut self, name: &str) -> Result<()> {
        if self.pipes.remove(name).is_none() {
            return Err(RelaxError::NoPipe(name.to_string()));
        }
        for pipes in self.pipe_bundles.values_mut() {
            pipes.retain(|p| p != name);
        }
        self.pipe_bundles.retain(|_, pipes| !pipes.is_empty());
        if self.current_pipe.as_deref() == Some(name) {
            self.current_pipe = None;
        }
        Ok(())
    }

    /// Copies the contents of `pipe_from`, the current pipe when `None`, into
    /// the new pipe `pipe_to`.
    pub fn copy(&mut self, pipe_from: Option<&str>, pipe_to: &str, bundle: Option<&str>) -> Result<()> {
        if self.pipes.contains_key(pipe_to) {
            return Err(RelaxError::Pipe(pipe_to.to_string()));
        }
        let source = match pipe_from {
            Some(name) => self.get(name)?,
            None => self.current()?,
        }
        .clone();
        self.pipes.insert(pipe_to.to_string(), source);
        if let Some(bundle) = bundle {
            self.pipe_bundles
                .entry(bundle.to_string())
                .or_default()
                .push(pipe_to.to_string());
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty() && self.pipe_bundles.is_empty()
    }

    pub fn pipe_names(&self) -> Vec<&str> {
        self.pipes.keys().map(String::as_str).collect()
    }

    pub fn bundle_names(&self) -> Vec<&str> {
        self.pipe_bundles.keys().map(String::as_str).collect()
    }

    /// The bundle holding the pipe.
    pub fn pipe_bundle(&self, pipe_name: &str) -> Option<&str> {
        self.pipe_bundles
            .iter()
            .find(|(_, pipes)| pipes.iter().any(|p| p == pipe_name))
            .map(|(bundle, _)| bundle.as_str())
    }

    /// Adds an existing pipe to a bundle, creating the bundle as needed. A
    /// pipe belongs to at most one bundle.
    pub fn bundle(&mut self, bundle: &str, pipe_name: &str) -> Result<()> {
        if !self.pipes.contains_key(pipe_name) {
            return Err(RelaxError::NoPipe(pipe_name.to_string()));
        }
        if let Some(existing) = self.pipe_bundle(pipe_name) {
            return Err(RelaxError::General(format!(
                "The data pipe '{pipe_name}' is already within the bundle '{existing}'."
            )));
        }
        self.pipe_bundles
            .entry(bundle.to_string())
            .or_default()
            .push(pipe_name.to_string());
        Ok(())
    }

    /// Writes the given pipes, or the whole store, as a relax state file.
    /// The store level data is only written with the whole store.
    pub fn to_xml(&self, writer: impl Write, pipes: Option<&[&str]>) -> Result<()> {
        let names: Vec<&str> = match pipes {
            Some(names) => {
                let mut names = names.to_vec();
                names.sort_unstable();
                for name in &names {
                    self.get(name)?;
                }
                names
            }
            None => self.pipe_names(),
        };

        let mut root = XmlElement::new("relax")
            .with_attribute("xmlns", RELAX_NAMESPACE)
            .with_attribute("version", env!("CARGO_PKG_VERSION"))
            .with_attribute("time", time::now())
            .with_attribute("file_version", FILE_VERSION);

        if pipes.is_none() {
            fill_object_contents(&mut root, self, &[]);
        }

        for name in names {
            let pipe = self.get(name)?;
            let mut element = XmlElement::new("pipe")
                .with_attribute("desc", "The contents of a relax data pipe")
                .with_attribute("name", name)
                .with_attribute("type", pipe.pipe_type.as_str());
            pipe.to_xml(&mut element);
            root.children.push(element);
        }

        root.write_to(writer)?;
        Ok(())
    }

    /// Loads a relax state file. With `pipe_to` the single pipe of the file
    /// is loaded into that existing, empty pipe of the same type. Returns the
    /// names of the pipes filled.
    pub fn from_xml(&mut self, reader: impl BufRead, pipe_to: Option<&str>) -> Result<Vec<String>> {
        let root = XmlElement::read_from(reader)?;
        if root.name != "relax" {
            return Err(RelaxError::InvalidData(format!(
                "The XML root element <{}> is not a relax state.",
                root.name
            )));
        }
        let file_version = root.attribute("file_version").unwrap_or("1");
        debug!(file_version, "Reading a relax state");

        let pipe_nodes: Vec<&XmlElement> = root.children_named("pipe").collect();

        if let Some(pipe_to) = pipe_to {
            let node = match pipe_nodes.as_slice() {
                [node] => *node,
                [] => {
                    return Err(RelaxError::General(format!(
                        "The pipe_to target pipe argument '{pipe_to}' cannot be given as the file contains no pipe elements."
                    )));
                }
                _ => {
                    return Err(RelaxError::General(format!(
                        "The pipe_to target pipe argument '{pipe_to}' cannot be given as the file contains multiple pipe elements."
                    )));
                }
            };
            let file_type = node.require_attribute("type")?;
            let target = self.get_mut(pipe_to)?;
            if file_type != target.pipe_type.as_str() {
                return Err(RelaxError::General(format!(
                    "The XML file pipe type '{file_type}' does not match the pipe type '{}'",
                    target.pipe_type
                )));
            }
            if !target.is_empty() {
                return Err(RelaxError::General(format!(
                    "The data pipe '{pipe_to}' is not empty."
                )));
            }
            target.from_xml(node)?;
            return Ok(vec![pipe_to.to_string()]);
        }

        xml_to_object(&root, self, &["pipe"])?;

        let mut checked = Vec::new();
        for node in &pipe_nodes {
            let name = node.require_attribute("name")?;
            let pipe_type = node.require_attribute("type")?;
            if self.pipes.contains_key(name) {
                return Err(RelaxError::Pipe(name.to_string()));
            }
            let pipe_type: PipeType = pipe_type.parse()?;
            checked.push((*node, name, pipe_type));
        }

        let mut loaded = Vec::new();
        for (node, name, pipe_type) in checked {
            let mut pipe = PipeContainer::new(pipe_type);
            pipe.from_xml(node)?;
            self.pipes.insert(name.to_string(), pipe);
            if self.current_pipe.is_none() {
                self.current_pipe = Some(name.to_string());
            }
            loaded.push(name.to_string());
        }
        if self
            .current_pipe
            .as_ref()
            .is_some_and(|name| !self.pipes.contains_key(name))
        {
            self.current_pipe = loaded.first().cloned();
        }
        info!(pipes = ?loaded, "Loaded the relax state");
        Ok(loaded)
    }
}

impl XmlObject for DataStore {
    type Error = RelaxError;

    fn xml_fields(&self) -> Vec<(String, PyValue)> {
        let bundles = self
            .pipe_bundles
            .iter()
            .map(|(bundle, pipes)| (bundle.clone(), PyValue::str_list(pipes)))
            .collect();
        vec![
            (
                "current_pipe".to_string(),
                self.current_pipe.as_deref().into(),
            ),
            ("pipe_bundles".to_string(), PyValue::Dict(bundles)),
        ]
    }

    fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<()> {
        match name {
            "current_pipe" => self.current_pipe = value.to_opt_string(name)?,
            "pipe_bundles" => {
                self.pipe_bundles = value
                    .to_dict(name)?
                    .iter()
                    .map(|(bundle, pipes)| {
                        let pipes = pipes.to_opt_string_list(name)?.into_iter().flatten().collect();
                        Ok((bundle.clone(), pipes))
                    })
                    .collect::<Result<_>>()?;
            }
            _ => debug!(field = name, "Skipping an unknown data store attribute."),
        }
        Ok(())
    }
}
