use crate::core::error::{RelaxError, Result};
use crate::core::io::xml::{PyValue, XmlElement, XmlObject, fill_object_contents, xml_to_object};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// The per-spin parameters of the spectral density mapping analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpinParam {
    R,
    Csa,
    J0,
    Jwx,
    Jwh,
}

impl SpinParam {
    pub const ALL: [SpinParam; 5] = [
        SpinParam::R,
        SpinParam::Csa,
        SpinParam::J0,
        SpinParam::Jwx,
        SpinParam::Jwh,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SpinParam::R => "r",
            SpinParam::Csa => "csa",
            SpinParam::J0 => "j0",
            SpinParam::Jwx => "jwx",
            SpinParam::Jwh => "jwh",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for SpinParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value with its error and Monte Carlo simulation values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpinParameter {
    pub value: Option<f64>,
    pub error: Option<f64>,
    pub sim: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpinContainer {
    pub num: Option<i64>,
    pub name: Option<String>,
    pub select: bool,
    pub isotope: Option<String>,
    pub element: Option<String>,
    pub r: SpinParameter,
    pub csa: SpinParameter,
    pub j0: SpinParameter,
    pub jwx: SpinParameter,
    pub jwh: SpinParameter,
    pub ri_data: BTreeMap<String, f64>,
    pub ri_data_err: BTreeMap<String, f64>,
    pub ri_data_sim: BTreeMap<String, Vec<f64>>,
}

impl Default for SpinContainer {
    fn default() -> Self {
        Self {
            num: None,
            name: None,
            select: true,
            isotope: None,
            element: None,
            r: SpinParameter::default(),
            csa: SpinParameter::default(),
            j0: SpinParameter::default(),
            jwx: SpinParameter::default(),
            jwh: SpinParameter::default(),
            ri_data: BTreeMap::new(),
            ri_data_err: BTreeMap::new(),
            ri_data_sim: BTreeMap::new(),
        }
    }
}

impl SpinContainer {
    pub fn new(num: Option<i64>, name: Option<&str>) -> Self {
        Self {
            num,
            name: name.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn param(&self, param: SpinParam) -> &SpinParameter {
        match param {
            SpinParam::R => &self.r,
            SpinParam::Csa => &self.csa,
            SpinParam::J0 => &self.j0,
            SpinParam::Jwx => &self.jwx,
            SpinParam::Jwh => &self.jwh,
        }
    }

    pub fn param_mut(&mut self, param: SpinParam) -> &mut SpinParameter {
        match param {
            SpinParam::R => &mut self.r,
            SpinParam::Csa => &mut self.csa,
            SpinParam::J0 => &mut self.j0,
            SpinParam::Jwx => &mut self.jwx,
            SpinParam::Jwh => &mut self.jwh,
        }
    }

    fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("spin")
            .with_attribute("desc", "Spin container")
            .with_attribute("name", attr_text(self.name.as_deref()))
            .with_attribute("num", attr_num(self.num));
        fill_object_contents(&mut element, self, &[]);
        element
    }

    fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut spin = SpinContainer::new(
            parse_attr_num(element, "num")?,
            parse_attr_text(element, "name").as_deref(),
        );
        xml_to_object(element, &mut spin, &[])?;
        Ok(spin)
    }
}

fn float_dict(map: &BTreeMap<String, f64>) -> PyValue {
    PyValue::Dict(map.iter().map(|(k, &v)| (k.clone(), v.into())).collect())
}

fn read_float_dict(value: &PyValue, name: &str) -> Result<BTreeMap<String, f64>> {
    value
        .to_dict(name)?
        .iter()
        .map(|(k, v)| Ok((k.clone(), v.to_f64(name)?)))
        .collect()
}

impl XmlObject for SpinContainer {
    type Error = RelaxError;

    fn xml_fields(&self) -> Vec<(String, PyValue)> {
        let mut fields = vec![
            ("select".to_string(), self.select.into()),
            ("isotope".to_string(), self.isotope.clone().into()),
            ("element".to_string(), self.element.clone().into()),
        ];
        for param in SpinParam::ALL {
            let data = self.param(param);
            if data.value.is_some() {
                fields.push((param.name().to_string(), data.value.into()));
            }
            if data.error.is_some() {
                fields.push((format!("{param}_err"), data.error.into()));
            }
            if !data.sim.is_empty() {
                fields.push((format!("{param}_sim"), PyValue::float_list(&data.sim)));
            }
        }
        if !self.ri_data.is_empty() {
            fields.push(("ri_data".to_string(), float_dict(&self.ri_data)));
        }
        if !self.ri_data_err.is_empty() {
            fields.push(("ri_data_err".to_string(), float_dict(&self.ri_data_err)));
        }
        if !self.ri_data_sim.is_empty() {
            let sims = self
                .ri_data_sim
                .iter()
                .map(|(k, v)| (k.clone(), PyValue::float_list(v)))
                .collect();
            fields.push(("ri_data_sim".to_string(), PyValue::Dict(sims)));
        }
        fields
    }

    fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<()> {
        match name {
            "select" => self.select = value.to_bool(name)?,
            "isotope" => self.isotope = value.to_opt_string(name)?,
            "element" => self.element = value.to_opt_string(name)?,
            "ri_data" => self.ri_data = read_float_dict(&value, name)?,
            "ri_data_err" => self.ri_data_err = read_float_dict(&value, name)?,
            "ri_data_sim" => {
                self.ri_data_sim = value
                    .to_dict(name)?
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_f64_list(name)?)))
                    .collect::<Result<_>>()?;
            }
            _ => {
                let (base, suffix) = match name.rsplit_once('_') {
                    Some((base, suffix @ ("err" | "sim"))) => (base, Some(suffix)),
                    _ => (name, None),
                };
                let Some(param) = SpinParam::from_name(base) else {
                    debug!(field = name, "Skipping an unknown spin attribute.");
                    return Ok(());
                };
                let target = self.param_mut(param);
                match suffix {
                    None => target.value = value.to_opt_f64(name)?,
                    Some("err") => target.error = value.to_opt_f64(name)?,
                    _ => target.sim = value.to_f64_list(name)?,
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidueContainer {
    pub num: Option<i64>,
    pub name: Option<String>,
    pub spins: Vec<SpinContainer>,
}

impl ResidueContainer {
    pub fn new(num: Option<i64>, name: Option<&str>) -> Self {
        Self {
            num,
            name: name.map(str::to_string),
            spins: Vec::new(),
        }
    }

    fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("res")
            .with_attribute("desc", "Residue container")
            .with_attribute("name", attr_text(self.name.as_deref()))
            .with_attribute("num", attr_num(self.num));
        element
            .children
            .extend(self.spins.iter().map(SpinContainer::to_xml));
        element
    }

    fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut residue = ResidueContainer::new(
            parse_attr_num(element, "num")?,
            parse_attr_text(element, "name").as_deref(),
        );
        for spin in element.children_named("spin") {
            residue.spins.push(SpinContainer::from_xml(spin)?);
        }
        Ok(residue)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoleculeContainer {
    pub name: Option<String>,
    pub mol_type: Option<String>,
    pub residues: Vec<ResidueContainer>,
}

impl MoleculeContainer {
    pub fn new(name: Option<&str>, mol_type: Option<&str>) -> Self {
        Self {
            name: name.map(str::to_string),
            mol_type: mol_type.map(str::to_string),
            residues: Vec::new(),
        }
    }

    pub fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("mol")
            .with_attribute("desc", "Molecule container")
            .with_attribute("name", attr_text(self.name.as_deref()))
            .with_attribute("type", attr_text(self.mol_type.as_deref()));
        element
            .children
            .extend(self.residues.iter().map(ResidueContainer::to_xml));
        element
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut molecule = MoleculeContainer::new(
            parse_attr_text(element, "name").as_deref(),
            parse_attr_text(element, "type").as_deref(),
        );
        for residue in element.children_named("res") {
            molecule.residues.push(ResidueContainer::from_xml(residue)?);
        }
        Ok(molecule)
    }
}

pub(crate) fn attr_text(value: Option<&str>) -> String {
    value.unwrap_or("None").to_string()
}

pub(crate) fn attr_num(value: Option<i64>) -> String {
    value.map_or_else(|| "None".to_string(), |n| n.to_string())
}

pub(crate) fn parse_attr_text(element: &XmlElement, key: &str) -> Option<String> {
    element
        .attribute(key)
        .filter(|v| *v != "None")
        .map(str::to_string)
}

pub(crate) fn parse_attr_num(element: &XmlElement, key: &str) -> Result<Option<i64>> {
    match element.attribute(key) {
        None | Some("None") => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|_| {
            RelaxError::InvalidData(format!(
                "The {} attribute '{}' of <{}> is not an integer.",
                key, text, element.name
            ))
        }),
    }
}

/// Builds the canonical identifier `#mol:res@spin` of a spin. Numbers take
/// precedence over names.
pub fn generate_spin_id(
    mol_name: Option<&str>,
    res_num: Option<i64>,
    res_name: Option<&str>,
    spin_num: Option<i64>,
    spin_name: Option<&str>,
) -> String {
    let mut id = String::new();
    if let Some(mol) = mol_name {
        id.push('#');
        id.push_str(mol);
    }
    match (res_num, res_name) {
        (Some(num), _) => id.push_str(&format!(":{num}")),
        (None, Some(name)) => id.push_str(&format!(":{name}")),
        _ => {}
    }
    match (spin_num, spin_name) {
        (Some(num), _) => id.push_str(&format!("@{num}")),
        (None, Some(name)) => id.push_str(&format!("@{name}")),
        _ => {}
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_molecule() -> MoleculeContainer {
        let mut spin = SpinContainer::new(Some(12), Some("N"));
        spin.isotope = Some("15N".into());
        spin.r.value = Some(1.02e-10);
        spin.csa.value = Some(-172e-6);
        spin.j0.value = Some(4.1e-9);
        spin.j0.error = Some(1.0 / 3.0 * 1e-10);
        spin.j0.sim = vec![4.0e-9, 4.2e-9];
        spin.ri_data.insert("R1_600".into(), 1.2345);
        spin.ri_data_err.insert("R1_600".into(), 0.01);
        spin.ri_data_sim.insert("R1_600".into(), vec![1.23, 1.24]);

        let mut residue = ResidueContainer::new(Some(5), Some("GLY"));
        residue.spins.push(spin);
        residue.spins.push(SpinContainer::new(None, Some("H")));

        let mut molecule = MoleculeContainer::new(Some("Ap4Aase"), Some("protein"));
        molecule.residues.push(residue);
        molecule
    }

    #[test]
    fn spin_tree_survives_xml() {
        let molecule = sample_molecule();
        let element = molecule.to_xml();
        assert_eq!(element.attribute("type"), Some("protein"));
        let restored = MoleculeContainer::from_xml(&element).unwrap();
        assert_eq!(restored, molecule);
    }

    #[test]
    fn unset_parameters_are_not_written() {
        let element = SpinContainer::new(Some(1), None).to_xml();
        let names: Vec<_> = element.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["select", "isotope", "element"]);
        assert_eq!(element.attribute("name"), Some("None"));
    }

    #[test]
    fn unknown_spin_attributes_are_ignored() {
        let mut spin = SpinContainer::default();
        spin.set_xml_field("s2", PyValue::Float(0.8)).unwrap();
        spin.set_xml_field("jwh_err", PyValue::Float(1e-12)).unwrap();
        assert_eq!(spin.jwh.error, Some(1e-12));
    }

    #[test]
    fn spin_ids_prefer_numbers() {
        assert_eq!(
            generate_spin_id(Some("m"), Some(3), Some("ALA"), None, Some("N")),
            "#m:3@N"
        );
        assert_eq!(generate_spin_id(None, None, Some("ALA"), Some(7), None), ":ALA@7");
        assert_eq!(generate_spin_id(None, None, None, None, None), "");
    }
}
