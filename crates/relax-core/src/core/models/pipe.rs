use super::align_tensor::AlignTensorList;
use super::mol_res_spin::MoleculeContainer;
use crate::core::error::{RelaxError, Result};
use crate::core::io::xml::{PyValue, XmlElement, XmlObject, fill_object_contents, xml_to_object};
use crate::core::structure::Internal;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeType {
    ConsistencyTests,
    FrameOrder,
    JwMapping,
    Hybrid,
    ModelFree,
    NState,
    Noe,
    RelaxDisp,
    RelaxFit,
}

impl PipeType {
    pub const ALL: [PipeType; 9] = [
        PipeType::ConsistencyTests,
        PipeType::FrameOrder,
        PipeType::JwMapping,
        PipeType::Hybrid,
        PipeType::ModelFree,
        PipeType::NState,
        PipeType::Noe,
        PipeType::RelaxDisp,
        PipeType::RelaxFit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipeType::ConsistencyTests => "ct",
            PipeType::FrameOrder => "frame order",
            PipeType::JwMapping => "jw",
            PipeType::Hybrid => "hybrid",
            PipeType::ModelFree => "mf",
            PipeType::NState => "N-state",
            PipeType::Noe => "noe",
            PipeType::RelaxDisp => "relax_disp",
            PipeType::RelaxFit => "relax_fit",
        }
    }
}

impl fmt::Display for PipeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipeType {
    type Err = RelaxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RelaxError::InvalidPipeType(s.to_string()))
    }
}

/// The relaxation data types used by the spectral density mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiType {
    R1,
    R2,
    Noe,
}

impl RiType {
    pub fn as_str(self) -> &'static str {
        match self {
            RiType::R1 => "R1",
            RiType::R2 => "R2",
            RiType::Noe => "NOE",
        }
    }
}

impl fmt::Display for RiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiType {
    type Err = RelaxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "R1" => Ok(RiType::R1),
            "R2" => Ok(RiType::R2),
            "NOE" => Ok(RiType::Noe),
            other => Err(RelaxError::UnknownRiType(other.to_string())),
        }
    }
}

/// A data pipe: one self contained analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeContainer {
    pub pipe_type: PipeType,
    pub mol: Vec<MoleculeContainer>,
    pub jw_frq: Option<f64>,
    pub ri_ids: Vec<String>,
    pub ri_type: BTreeMap<String, RiType>,
    pub spectrometer_frq: BTreeMap<String, f64>,
    pub sim_number: Option<usize>,
    pub sim_state: bool,
    pub align_tensors: Option<AlignTensorList>,
    pub structure: Option<Internal>,
}

impl PipeContainer {
    pub fn new(pipe_type: PipeType) -> Self {
        Self {
            pipe_type,
            mol: Vec::new(),
            jw_frq: None,
            ri_ids: Vec::new(),
            ri_type: BTreeMap::new(),
            spectrometer_frq: BTreeMap::new(),
            sim_number: None,
            sim_state: false,
            align_tensors: None,
            structure: None,
        }
    }

    /// True when nothing has been added to the pipe.
    pub fn is_empty(&self) -> bool {
        self.mol.is_empty()
            && self.jw_frq.is_none()
            && self.ri_ids.is_empty()
            && self.sim_number.is_none()
            && self.align_tensors.as_ref().is_none_or(AlignTensorList::is_empty)
            && self.structure.as_ref().is_none_or(Internal::is_empty)
    }

    /// The distinct spectrometer frequencies of the loaded relaxation data,
    /// in loading order.
    pub fn frequencies(&self) -> Vec<f64> {
        let mut frqs: Vec<f64> = Vec::new();
        for id in &self.ri_ids {
            if let Some(&frq) = self.spectrometer_frq.get(id) {
                if !frqs.contains(&frq) {
                    frqs.push(frq);
                }
            }
        }
        frqs
    }

    pub fn to_xml(&self, element: &mut XmlElement) {
        let mut global = XmlElement::new("global")
            .with_attribute("desc", "Global data located in the top level of the data pipe");
        fill_object_contents(&mut global, self, &[]);
        element.children.push(global);

        element
            .children
            .extend(self.mol.iter().map(MoleculeContainer::to_xml));

        if let Some(tensors) = &self.align_tensors {
            tensors.to_xml(element);
        }
        if let Some(structure) = &self.structure {
            structure.to_xml(element);
        }
    }

    pub fn from_xml(&mut self, element: &XmlElement) -> Result<()> {
        if let Some(global) = element.child("global") {
            xml_to_object(global, self, &[])?;
        }
        for mol in element.children_named("mol") {
            self.mol.push(MoleculeContainer::from_xml(mol)?);
        }
        if let Some(tensors) = element.child("align_tensors") {
            self.align_tensors = Some(AlignTensorList::from_xml(tensors)?);
        }
        if let Some(structure) = element.child("structure") {
            self.structure = Some(Internal::from_xml(structure)?);
        }
        Ok(())
    }
}

impl XmlObject for PipeContainer {
    type Error = RelaxError;

    fn xml_fields(&self) -> Vec<(String, PyValue)> {
        let ri_type = self
            .ri_type
            .iter()
            .map(|(id, t)| (id.clone(), PyValue::Str(t.as_str().to_string())))
            .collect();
        let spectrometer_frq = self
            .spectrometer_frq
            .iter()
            .map(|(id, &frq)| (id.clone(), frq.into()))
            .collect();
        vec![
            ("jw_frq".to_string(), self.jw_frq.into()),
            ("ri_ids".to_string(), PyValue::str_list(&self.ri_ids)),
            ("ri_type".to_string(), PyValue::Dict(ri_type)),
            ("spectrometer_frq".to_string(), PyValue::Dict(spectrometer_frq)),
            (
                "sim_number".to_string(),
                self.sim_number.map(|n| n as i64).into(),
            ),
            ("sim_state".to_string(), self.sim_state.into()),
        ]
    }

    fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<()> {
        match name {
            "jw_frq" => self.jw_frq = value.to_opt_f64(name)?,
            "ri_ids" => {
                self.ri_ids = value
                    .to_opt_string_list(name)?
                    .into_iter()
                    .flatten()
                    .collect();
            }
            "ri_type" => {
                self.ri_type = value
                    .to_dict(name)?
                    .iter()
                    .map(|(id, t)| {
                        let text = t.to_opt_string(name)?.unwrap_or_default();
                        Ok((id.clone(), text.parse()?))
                    })
                    .collect::<Result<_>>()?;
            }
            "spectrometer_frq" => {
                self.spectrometer_frq = value
                    .to_dict(name)?
                    .iter()
                    .map(|(id, frq)| Ok((id.clone(), frq.to_f64(name)?)))
                    .collect::<Result<_>>()?;
            }
            "sim_number" => {
                self.sim_number = value
                    .to_opt_i64(name)?
                    .map(|n| usize::try_from(n).unwrap_or(0));
            }
            "sim_state" => self.sim_state = value.to_bool(name)?,
            _ => debug!(field = name, "Skipping an unknown global pipe attribute."),
        }
        Ok(())
    }
}
