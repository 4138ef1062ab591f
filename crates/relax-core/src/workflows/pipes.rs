use crate::core::error::Result;
use crate::core::models::pipe::PipeType;
use crate::core::store::DataStore;
use std::fmt;
use tracing::info;

/// One row of the data pipe listing.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeSummary {
    pub name: String,
    pub pipe_type: PipeType,
    pub bundle: Option<String>,
    pub current: bool,
}

/// Creates a pipe and makes it current.
pub fn create(store: &mut DataStore, pipe_name: &str, pipe_type: &str, bundle: Option<&str>) -> Result<()> {
    store.add(pipe_name, pipe_type, bundle, true)?;
    info!(pipe = pipe_name, pipe_type, "Created the data pipe");
    Ok(())
}

pub fn switch(store: &mut DataStore, pipe_name: &str) -> Result<()> {
    store.switch(pipe_name)?;
    info!(pipe = pipe_name, "Switched the current data pipe");
    Ok(())
}

/// Deletes one pipe, or every pipe when `pipe_name` is `None`.
pub fn delete(store: &mut DataStore, pipe_name: Option<&str>) -> Result<()> {
    match pipe_name {
        Some(name) => store.delete(name)?,
        None => store.reset(),
    }
    Ok(())
}

pub fn copy(store: &mut DataStore, pipe_from: Option<&str>, pipe_to: &str, bundle: Option<&str>) -> Result<()> {
    store.copy(pipe_from, pipe_to, bundle)
}

pub fn bundle(store: &mut DataStore, bundle: &str, pipe_name: &str) -> Result<()> {
    store.bundle(bundle, pipe_name)
}

pub fn display(store: &DataStore) -> Vec<PipeSummary> {
    store
        .pipe_names()
        .into_iter()
        .filter_map(|name| {
            let pipe = store.get(name).ok()?;
            Some(PipeSummary {
                name: name.to_string(),
                pipe_type: pipe.pipe_type,
                bundle: store.pipe_bundle(name).map(str::to_string),
                current: store.current_name() == Some(name),
            })
        })
        .collect()
}

/// Renders the listing as the relax pipe table.
pub struct PipeTable<'a>(pub &'a [PipeSummary]);

impl fmt::Display for PipeTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<20} {:<15} {:<20} {}",
            "Data pipe name", "Data pipe type", "Bundle", "Current"
        )?;
        for row in self.0 {
            writeln!(
                f,
                "{:<20} {:<15} {:<20} {}",
                format!("'{}'", row.name),
                format!("'{}'", row.pipe_type),
                row.bundle.as_deref().map_or_else(|| "None".to_string(), |b| format!("'{b}'")),
                if row.current { "*" } else { "" }
            )?;
        }
        Ok(())
    }
}
