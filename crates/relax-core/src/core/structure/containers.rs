use crate::core::constants::is_amino_acid;
use crate::core::error::{RelaxError, Result};
use crate::core::io::xml::{PyValue, XmlElement, XmlObject, fill_object_contents, xml_to_object};
use crate::core::models::mol_res_spin::{attr_num, attr_text, parse_attr_num, parse_attr_text};
use nalgebra::Point3;

/// The molecule type derived from the residue names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MolType {
    Protein,
    Other,
}

/// The per-atom data handed to [`MolContainer::atom_add`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomData {
    pub atom_num: Option<i64>,
    pub atom_name: Option<String>,
    pub res_name: Option<String>,
    pub res_num: Option<i64>,
    pub chain_id: Option<String>,
    pub seg_id: Option<String>,
    pub element: Option<String>,
    pub pdb_record: Option<String>,
    pub pos: [f64; 3],
}

/// One molecule of one model, stored as parallel per-atom arrays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MolContainer {
    pub mol_name: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_mol_num: Option<i64>,
    pub file_model: Option<i64>,

    pub atom_num: Vec<Option<i64>>,
    pub atom_name: Vec<Option<String>>,
    pub bonded: Vec<Vec<usize>>,
    pub chain_id: Vec<Option<String>>,
    pub element: Vec<Option<String>>,
    pub pdb_record: Vec<Option<String>>,
    pub res_name: Vec<Option<String>>,
    pub res_num: Vec<Option<i64>>,
    pub seg_id: Vec<Option<String>>,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl MolContainer {
    pub fn new(mol_name: Option<&str>) -> Self {
        Self {
            mol_name: mol_name.map(str::to_string),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.atom_name.len()
    }

    /// True when neither a name nor any atom has been set.
    pub fn is_empty(&self) -> bool {
        self.mol_name.is_none()
            && self.file_name.is_none()
            && self.file_path.is_none()
            && self.file_mol_num.is_none()
            && self.file_model.is_none()
            && self.atom_name.is_empty()
    }

    /// Appends an atom and returns its index.
    pub fn atom_add(&mut self, atom: AtomData) -> usize {
        self.atom_num.push(atom.atom_num);
        self.atom_name.push(atom.atom_name);
        self.bonded.push(Vec::new());
        self.chain_id.push(atom.chain_id);
        self.element.push(atom.element);
        self.pdb_record.push(atom.pdb_record);
        self.res_name.push(atom.res_name);
        self.res_num.push(atom.res_num);
        self.seg_id.push(atom.seg_id);
        self.x.push(atom.pos[0]);
        self.y.push(atom.pos[1]);
        self.z.push(atom.pos[2]);
        self.atom_name.len() - 1
    }

    /// Bonds two atoms in both directions, skipping existing bonds.
    pub fn atom_connect(&mut self, index1: usize, index2: usize) {
        if !self.bonded[index1].contains(&index2) {
            self.bonded[index1].push(index2);
        }
        if !self.bonded[index2].contains(&index1) {
            self.bonded[index2].push(index1);
        }
    }

    /// The index of the atom with the given atom number.
    pub fn atom_index(&self, atom_num: i64) -> Option<usize> {
        self.atom_num.iter().position(|&n| n == Some(atom_num))
    }

    pub fn pos(&self, index: usize) -> Point3<f64> {
        Point3::new(self.x[index], self.y[index], self.z[index])
    }

    pub fn set_pos(&mut self, index: usize, pos: &Point3<f64>) {
        self.x[index] = pos.x;
        self.y[index] = pos.y;
        self.z[index] = pos.z;
    }

    /// The atom data of one index, without bonds.
    pub fn atom(&self, index: usize) -> AtomData {
        AtomData {
            atom_num: self.atom_num[index],
            atom_name: self.atom_name[index].clone(),
            res_name: self.res_name[index].clone(),
            res_num: self.res_num[index],
            chain_id: self.chain_id[index].clone(),
            seg_id: self.seg_id[index].clone(),
            element: self.element[index].clone(),
            pdb_record: self.pdb_record[index].clone(),
            pos: [self.x[index], self.y[index], self.z[index]],
        }
    }

    /// Removes one atom, dropping bonds to it and shifting higher indices.
    pub fn atom_remove(&mut self, index: usize) {
        self.atom_num.remove(index);
        self.atom_name.remove(index);
        self.bonded.remove(index);
        self.chain_id.remove(index);
        self.element.remove(index);
        self.pdb_record.remove(index);
        self.res_name.remove(index);
        self.res_num.remove(index);
        self.seg_id.remove(index);
        self.x.remove(index);
        self.y.remove(index);
        self.z.remove(index);

        for bonds in &mut self.bonded {
            bonds.retain(|&b| b != index);
            for b in bonds.iter_mut() {
                if *b > index {
                    *b -= 1;
                }
            }
        }
    }

    /// Appends the atoms of `other`, renumbering them after the current atoms.
    pub fn merge(&mut self, other: &MolContainer) {
        let offset = self.len();
        for i in 0..other.len() {
            let mut atom = other.atom(i);
            atom.atom_num = Some((offset + i + 1) as i64);
            let index = self.atom_add(atom);
            self.bonded[index] = other.bonded[i].iter().map(|&b| b + offset).collect();
        }
    }

    /// Distinct consecutive residues as `(res_num, res_name)` pairs.
    pub fn residues(&self) -> Vec<(Option<i64>, Option<&str>)> {
        let mut residues: Vec<(Option<i64>, Option<&str>)> = Vec::new();
        for (num, name) in self.res_num.iter().zip(&self.res_name) {
            let residue = (*num, name.as_deref());
            if residues.last() != Some(&residue) {
                residues.push(residue);
            }
        }
        residues
    }

    pub fn mol_type(&self) -> MolType {
        if self
            .res_name
            .iter()
            .flatten()
            .any(|name| is_amino_acid(name))
        {
            MolType::Protein
        } else {
            MolType::Other
        }
    }

    /// The fields compared when checking that two models hold the same atoms.
    pub(crate) fn atom_signature(&self, index: usize) -> AtomSignature<'_> {
        (
            self.pdb_record[index].as_deref(),
            self.atom_num[index],
            self.atom_name[index].as_deref(),
            self.res_name[index].as_deref(),
            self.chain_id[index].as_deref(),
            self.res_num[index],
            self.seg_id[index].as_deref(),
            self.element[index].as_deref(),
        )
    }

    pub fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("mol_cont")
            .with_attribute("desc", "Molecule container")
            .with_attribute("name", attr_text(self.mol_name.as_deref()));
        fill_object_contents(&mut element, self, &[]);
        element
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut mol = MolContainer::new(parse_attr_text(element, "name").as_deref());
        xml_to_object(element, &mut mol, &[])?;
        if mol.bonded.len() < mol.len() {
            mol.bonded.resize_with(mol.len(), Vec::new);
        }
        let n = mol.len();
        let consistent = [
            mol.atom_num.len(),
            mol.chain_id.len(),
            mol.element.len(),
            mol.pdb_record.len(),
            mol.res_name.len(),
            mol.res_num.len(),
            mol.seg_id.len(),
            mol.x.len(),
            mol.y.len(),
            mol.z.len(),
            mol.bonded.len(),
        ]
        .iter()
        .all(|&len| len == n);
        if !consistent {
            return Err(RelaxError::Structure(format!(
                "The atomic arrays of the molecule '{}' are of unequal length.",
                attr_text(mol.mol_name.as_deref())
            )));
        }
        Ok(mol)
    }
}

pub(crate) type AtomSignature<'a> = (
    Option<&'a str>,
    Option<i64>,
    Option<&'a str>,
    Option<&'a str>,
    Option<&'a str>,
    Option<i64>,
    Option<&'a str>,
    Option<&'a str>,
);

fn opt_str_list(values: &[Option<String>]) -> PyValue {
    PyValue::List(values.iter().map(|v| v.as_deref().into()).collect())
}

fn opt_int_list(values: &[Option<i64>]) -> PyValue {
    PyValue::List(values.iter().map(|&v| v.into()).collect())
}

impl XmlObject for MolContainer {
    type Error = RelaxError;

    fn xml_fields(&self) -> Vec<(String, PyValue)> {
        let bonded = PyValue::List(
            self.bonded
                .iter()
                .map(|b| PyValue::List(b.iter().map(|&i| PyValue::Int(i as i64)).collect()))
                .collect(),
        );
        vec![
            ("atom_name".to_string(), opt_str_list(&self.atom_name)),
            ("atom_num".to_string(), opt_int_list(&self.atom_num)),
            ("bonded".to_string(), bonded),
            ("chain_id".to_string(), opt_str_list(&self.chain_id)),
            ("element".to_string(), opt_str_list(&self.element)),
            ("file_model".to_string(), self.file_model.into()),
            ("file_mol_num".to_string(), self.file_mol_num.into()),
            ("file_name".to_string(), self.file_name.as_deref().into()),
            ("file_path".to_string(), self.file_path.as_deref().into()),
            ("mol_name".to_string(), self.mol_name.as_deref().into()),
            ("pdb_record".to_string(), opt_str_list(&self.pdb_record)),
            ("res_name".to_string(), opt_str_list(&self.res_name)),
            ("res_num".to_string(), opt_int_list(&self.res_num)),
            ("seg_id".to_string(), opt_str_list(&self.seg_id)),
            ("x".to_string(), PyValue::float_list(&self.x)),
            ("y".to_string(), PyValue::float_list(&self.y)),
            ("z".to_string(), PyValue::float_list(&self.z)),
        ]
    }

    fn set_xml_field(&mut self, name: &str, value: PyValue) -> Result<()> {
        match name {
            "atom_name" => self.atom_name = value.to_opt_string_list(name)?,
            "atom_num" => self.atom_num = value.to_opt_i64_list(name)?,
            "bonded" => {
                self.bonded = value
                    .to_list(name)?
                    .iter()
                    .map(|bonds| {
                        bonds
                            .to_list(name)?
                            .iter()
                            .map(|b| Ok(b.to_i64(name)? as usize))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<_>>()?;
            }
            "chain_id" => self.chain_id = value.to_opt_string_list(name)?,
            "element" => self.element = value.to_opt_string_list(name)?,
            "file_model" => self.file_model = value.to_opt_i64(name)?,
            "file_mol_num" => self.file_mol_num = value.to_opt_i64(name)?,
            "file_name" => self.file_name = value.to_opt_string(name)?,
            "file_path" => self.file_path = value.to_opt_string(name)?,
            "mol_name" => self.mol_name = value.to_opt_string(name)?,
            "pdb_record" => self.pdb_record = value.to_opt_string_list(name)?,
            "res_name" => self.res_name = value.to_opt_string_list(name)?,
            "res_num" => self.res_num = value.to_opt_i64_list(name)?,
            "seg_id" => self.seg_id = value.to_opt_string_list(name)?,
            "x" => self.x = value.to_f64_list(name)?,
            "y" => self.y = value.to_f64_list(name)?,
            "z" => self.z = value.to_f64_list(name)?,
            other => tracing::debug!("Skipping the unknown molecule container field '{other}'."),
        }
        Ok(())
    }
}

/// One model of the ensemble.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelContainer {
    pub num: Option<i64>,
    pub mol: Vec<MolContainer>,
}

impl ModelContainer {
    pub fn new(num: Option<i64>) -> Self {
        Self {
            num,
            mol: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num.is_none() && self.mol.iter().all(MolContainer::is_empty)
    }

    pub fn mol_index(&self, name: &str) -> Option<usize> {
        self.mol
            .iter()
            .position(|m| m.mol_name.as_deref() == Some(name))
    }

    /// Adds a molecule. A lone empty container is renamed instead of
    /// appended to.
    pub fn add_mol(&mut self, name: Option<&str>) -> Result<&mut MolContainer> {
        if let Some(name) = name {
            if self.mol_index(name).is_some() {
                return Err(RelaxError::Structure(format!(
                    "The molecule '{name}' already exists."
                )));
            }
        }
        if self.mol.len() == 1 && self.mol[0].is_empty() {
            self.mol[0].mol_name = name.map(str::to_string);
        } else {
            self.mol.push(MolContainer::new(name));
        }
        let last = self.mol.len() - 1;
        Ok(&mut self.mol[last])
    }

    pub fn to_xml(&self) -> XmlElement {
        let mut element = XmlElement::new("model")
            .with_attribute("desc", "Model container")
            .with_attribute("num", attr_num(self.num));
        element
            .children
            .extend(self.mol.iter().map(MolContainer::to_xml));
        element
    }

    pub fn from_xml(element: &XmlElement) -> Result<Self> {
        let mut model = ModelContainer::new(parse_attr_num(element, "num")?);
        for mol in element.children_named("mol_cont") {
            model.mol.push(MolContainer::from_xml(mol)?);
        }
        Ok(model)
    }
}
