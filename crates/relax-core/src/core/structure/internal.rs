use super::bonds::{self, BOND_RADIUS};
use super::containers::{AtomData, ModelContainer, MolContainer};
use crate::core::error::{RelaxError, Result};
use crate::core::io::gaussian::GaussianLog;
use crate::core::io::pdb::{AtomRecord, Helix, PdbFile, Sheet, chain_id_to_mol_index};
use crate::core::io::traits::StructureFile;
use crate::core::io::xml::{PyValue, XmlElement, object_to_xml, read_value};
use crate::core::io::xyz::XyzFile;
use crate::core::models::selection::Selection;
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info, warn};

/// Options shared by the structure loaders.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Molecule numbers (from 1) to read, all when `None`.
    pub read_mol: Option<Vec<usize>>,
    /// Names of the molecules read, in order.
    pub set_mol_name: Option<Vec<String>>,
    /// Model numbers to read. XYZ models are numbered by position from 1.
    pub read_model: Option<Vec<i64>>,
    /// Numbers given to the models read, in order.
    pub set_model_num: Option<Vec<i64>>,
    /// Alternate location indicator selecting one coordinate set.
    pub alt_loc: Option<char>,
    /// Merge into existing molecules of the same name.
    pub merge: bool,
}

/// One atom yielded by [`Internal::atom_loop`].
#[derive(Debug, Clone, PartialEq)]
pub struct AtomInfo {
    pub mol_index: usize,
    pub atom_index: usize,
    pub mol_name: Option<String>,
    pub res_num: Option<i64>,
    pub res_name: Option<String>,
    pub atom_num: Option<i64>,
    pub atom_name: Option<String>,
    pub element: Option<String>,
    /// One position per model, or a single averaged position.
    pub pos: Vec<Point3<f64>>,
}

/// The result of [`Internal::bond_vectors`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BondVectors {
    /// One vector per model, pointing from the base atom to the attached atom.
    pub vectors: Vec<Vector3<f64>>,
    pub attached_name: Option<String>,
    pub warning: Option<String>,
}

struct FileInfo {
    name: String,
    path: String,
    root: String,
}

impl FileInfo {
    fn new(path: &Path) -> Self {
        let stem = |p: &Path| {
            p.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            name: path
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: path
                .parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            root: stem(path),
        }
    }
}

/// The molecules of one model read from a file.
struct ReadModel {
    num: Option<i64>,
    mols: Vec<(i64, MolContainer)>,
}

fn read_structure_file<F>(path: &Path) -> Result<F::Records>
where
    F: StructureFile,
    RelaxError: From<F::Error>,
{
    let file = File::open(path).map_err(|e| RelaxError::file(path, e))?;
    Ok(F::read_from(&mut BufReader::new(file))?)
}

fn model_label(num: Option<i64>) -> String {
    num.map_or_else(|| "None".to_string(), |n| n.to_string())
}

fn mol_label(name: Option<&str>) -> &str {
    name.unwrap_or("None")
}

fn selected(selection: &Selection, mol: &MolContainer, index: usize) -> bool {
    selection.contains(
        mol.mol_name.as_deref(),
        mol.res_num[index],
        mol.res_name[index].as_deref(),
        mol.atom_num[index],
        mol.atom_name[index].as_deref(),
    )
}

/// Converts the ATOM and HETATM records of one molecule, selecting a single
/// alternate location.
fn mol_from_pdb(atoms: &[AtomRecord], alt_loc: Option<char>) -> Result<MolContainer> {
    let mut mol = MolContainer::default();
    for record in atoms {
        match (record.alt_loc, alt_loc) {
            (Some(_), None) => {
                return Err(RelaxError::Structure(
                    "Multiple alternate location indicators are present in the PDB file, but the desired coordinate set has not been specified.".to_string(),
                ));
            }
            (Some(found), Some(wanted)) if found != wanted => continue,
            _ => {}
        }
        mol.atom_add(AtomData {
            atom_num: record.serial,
            atom_name: Some(record.name.clone()),
            res_name: record.res_name.clone(),
            res_num: record.res_seq,
            chain_id: record.chain_id.map(String::from),
            seg_id: None,
            element: record.element.clone(),
            pdb_record: Some(record.kind.as_str().to_string()),
            pos: [record.x, record.y, record.z],
        });
    }
    Ok(mol)
}

/// Moves the start and end of a secondary structure element past deleted
/// residues. `None` when nothing remains.
fn trim_range(
    start: Option<i64>,
    end: Option<i64>,
    deleted: &BTreeSet<i64>,
) -> Option<(i64, i64)> {
    let (mut start, mut end) = (start?, end?);
    while start <= end && deleted.contains(&start) {
        start += 1;
    }
    while end >= start && deleted.contains(&end) {
        end -= 1;
    }
    (start <= end).then_some((start, end))
}

fn trim_helix(helix: &mut Helix, deleted: &BTreeSet<i64>, res_data: &BTreeMap<i64, Option<String>>) -> bool {
    let Some((start, end)) = trim_range(helix.init_seq_num, helix.end_seq_num, deleted) else {
        return helix.init_seq_num.is_none() || helix.end_seq_num.is_none();
    };
    if helix.init_seq_num != Some(start) {
        helix.init_seq_num = Some(start);
        helix.init_res_name = res_data.get(&start).cloned().flatten();
    }
    if helix.end_seq_num != Some(end) {
        helix.end_seq_num = Some(end);
        helix.end_res_name = res_data.get(&end).cloned().flatten();
    }
    helix.length = Some((start..=end).filter(|r| !deleted.contains(r)).count() as i64);
    true
}

fn trim_sheet(sheet: &mut Sheet, deleted: &BTreeSet<i64>, res_data: &BTreeMap<i64, Option<String>>) -> bool {
    let Some((start, end)) = trim_range(sheet.init_seq_num, sheet.end_seq_num, deleted) else {
        return sheet.init_seq_num.is_none() || sheet.end_seq_num.is_none();
    };
    if sheet.init_seq_num != Some(start) {
        sheet.init_seq_num = Some(start);
        sheet.init_res_name = res_data.get(&start).cloned().flatten();
    }
    if sheet.end_seq_num != Some(end) {
        sheet.end_seq_num = Some(end);
        sheet.end_res_name = res_data.get(&end).cloned().flatten();
    }
    true
}

/// The internal structural object: an ensemble of models, each holding the
/// same molecules, plus the secondary structure of the loaded files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Internal {
    models: Vec<ModelContainer>,
    pub helices: Vec<Helix>,
    pub sheets: Vec<Sheet>,
}

impl Internal {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no models exist.
    pub fn empty(&self) -> bool {
        self.models.is_empty()
    }

    /// True when neither models nor secondary structure exist.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty() && self.helices.is_empty() && self.sheets.is_empty()
    }

    pub fn num_models(&self) -> usize {
        self.models.len()
    }

    pub fn models(&self) -> &[ModelContainer] {
        &self.models
    }

    /// Model indices in ascending model number, optionally restricted to one
    /// model.
    fn model_indices(&self, model: Option<i64>) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.models.len())
            .filter(|&i| model.is_none() || self.models[i].num == model)
            .collect();
        indices.sort_by_key(|&i| self.models[i].num);
        indices
    }

    /// The models sorted by number, or only the given model.
    pub fn model_loop(&self, model: Option<i64>) -> Vec<&ModelContainer> {
        self.model_indices(model)
            .into_iter()
            .map(|i| &self.models[i])
            .collect()
    }

    fn model_position(&self, num: Option<i64>) -> Option<usize> {
        self.models.iter().position(|m| m.num == num)
    }

    pub fn get_model(&self, num: i64) -> Option<&ModelContainer> {
        self.models.iter().find(|m| m.num == Some(num))
    }

    /// The named molecule. Without a model number only a single model may
    /// exist.
    pub fn get_molecule(&self, name: &str, model: Option<i64>) -> Result<Option<&MolContainer>> {
        let container = match model {
            None if self.models.len() > 1 => {
                return Err(RelaxError::Structure(format!(
                    "The target molecule cannot be determined as there are {} models already present.",
                    self.models.len()
                )));
            }
            None => self.models.first(),
            Some(num) => self.get_model(num),
        };
        Ok(container.and_then(|m| m.mol.iter().find(|mol| mol.mol_name.as_deref() == Some(name))))
    }

    pub fn has_molecule(&self, name: &str) -> bool {
        self.models.iter().any(|m| m.mol_index(name).is_some())
    }

    /// Adds a model, copying the molecules of the first model (or of
    /// `coords_from`). Returns the new model's index.
    pub fn add_model(&mut self, model: Option<i64>, coords_from: Option<i64>) -> Result<usize> {
        if model.is_some() && self.model_position(model).is_some() {
            return Err(RelaxError::Structure(format!(
                "The model '{}' already exists.",
                model_label(model)
            )));
        }

        if self.models.len() == 1 && self.models[0].num.is_none() && self.models[0].mol.is_empty() {
            self.models[0].num = model;
            return Ok(0);
        }

        let mol = match coords_from {
            Some(source) => self
                .get_model(source)
                .ok_or_else(|| {
                    RelaxError::Structure(format!("The model {source} to copy from does not exist."))
                })?
                .mol
                .clone(),
            None => self.models.first().map(|m| m.mol.clone()).unwrap_or_default(),
        };
        self.models.push(ModelContainer { num: model, mol });
        Ok(self.models.len() - 1)
    }

    /// Adds an empty molecule to every model.
    pub fn add_molecule(&mut self, name: &str) -> Result<()> {
        if self.models.is_empty() {
            self.add_model(None, None)?;
        }
        for model in &mut self.models {
            model.add_mol(Some(name))?;
        }
        Ok(())
    }

    fn find_mol(model: &ModelContainer, name: Option<&str>) -> Option<usize> {
        model.mol.iter().position(|m| m.mol_name.as_deref() == name)
    }

    /// Adds an atom to the named molecule of every model. `per_model`
    /// positions override `atom.pos` and must match the number of models.
    pub fn add_atom(
        &mut self,
        mol_name: Option<&str>,
        atom: AtomData,
        per_model: Option<&[[f64; 3]]>,
    ) -> Result<()> {
        if self.models.is_empty() {
            self.add_model(None, None)?;
        }
        if let Some(positions) = per_model {
            if positions.len() != self.models.len() {
                return Err(RelaxError::Structure(format!(
                    "The {} atomic positions does not match the {} models present.",
                    positions.len(),
                    self.models.len()
                )));
            }
        }

        for (i, model) in self.models.iter_mut().enumerate() {
            let index = match Self::find_mol(model, mol_name) {
                Some(index) => index,
                None => {
                    model.add_mol(mol_name)?;
                    model.mol.len() - 1
                }
            };
            let mut atom = atom.clone();
            if let Some(positions) = per_model {
                atom.pos = positions[i];
            }
            model.mol[index].atom_add(atom);
        }
        Ok(())
    }

    /// Bonds two atoms of the named molecule in every model.
    pub fn connect_atom(&mut self, mol_name: Option<&str>, index1: usize, index2: usize) -> Result<()> {
        for model in &mut self.models {
            let mol_index = Self::find_mol(model, mol_name).ok_or_else(|| {
                RelaxError::Structure(format!(
                    "The molecule '{}' cannot be found.",
                    mol_label(mol_name)
                ))
            })?;
            let mol = &mut model.mol[mol_index];
            if index1 >= mol.len() || index2 >= mol.len() {
                return Err(RelaxError::Structure(format!(
                    "The atom indices {index1} and {index2} are out of range for the {} atoms of the molecule.",
                    mol.len()
                )));
            }
            mol.atom_connect(index1, index2);
        }
        Ok(())
    }

    /// Whether the first atoms matching the two selections are bonded.
    /// Missing connectivity is inferred from interatomic distances.
    pub fn are_bonded(&mut self, atom_id1: &Selection, atom_id2: &Selection) -> Result<bool> {
        let Some(model) = self.models.first_mut() else {
            return Err(RelaxError::NoPdb);
        };
        for mol in &mut model.mol {
            let name = mol.mol_name.as_deref();
            if !atom_id1.contains_mol(name) || !atom_id2.contains_mol(name) {
                continue;
            }
            let index1 = (0..mol.len()).find(|&i| selected(atom_id1, mol, i));
            let index2 = (0..mol.len()).find(|&i| selected(atom_id2, mol, i));
            let (Some(index1), Some(index2)) = (index1, index2) else {
                continue;
            };
            for i in 0..mol.len() {
                if mol.bonded[i].is_empty() {
                    bonds::find_bonded_atoms(mol, i, BOND_RADIUS);
                }
            }
            return Ok(mol.bonded[index1].contains(&index2));
        }
        Ok(false)
    }

    /// Every selected atom of the first looped model with its positions.
    ///
    /// With `ave` the positions of all looped models are averaged, which
    /// requires the models to hold identical atom numbers.
    pub fn atom_loop(&self, selection: &Selection, model: Option<i64>, ave: bool) -> Result<Vec<AtomInfo>> {
        if self.models.is_empty() {
            return Err(RelaxError::NoPdb);
        }
        let indices = self.model_indices(model);
        let Some(&first_index) = indices.first() else {
            return Ok(Vec::new());
        };
        let first = &self.models[first_index];

        if ave {
            let same_atoms = indices.iter().all(|&m| {
                let other = &self.models[m];
                other.mol.len() == first.mol.len()
                    && other.mol.iter().zip(&first.mol).all(|(a, b)| a.atom_num == b.atom_num)
            });
            if !same_atoms {
                return Err(RelaxError::Structure(
                    "The loaded structures do not contain the same atoms.  The average structural properties can not be calculated.".to_string(),
                ));
            }
        } else if indices.len() > 1 {
            self.validate_models()?;
        }

        let mut atoms = Vec::new();
        for (mol_index, mol) in first.mol.iter().enumerate() {
            if !selection.contains_mol(mol.mol_name.as_deref()) {
                continue;
            }
            for i in 0..mol.len() {
                if !selected(selection, mol, i) {
                    continue;
                }
                let positions: Vec<Point3<f64>> = indices
                    .iter()
                    .map(|&m| self.models[m].mol[mol_index].pos(i))
                    .collect();
                let pos = if ave {
                    let sum: Vector3<f64> = positions.iter().map(|p| p.coords).sum();
                    vec![Point3::from(sum / positions.len() as f64)]
                } else {
                    positions
                };
                atoms.push(AtomInfo {
                    mol_index,
                    atom_index: i,
                    mol_name: mol.mol_name.clone(),
                    res_num: mol.res_num[i],
                    res_name: mol.res_name[i].clone(),
                    atom_num: mol.atom_num[i],
                    atom_name: mol.atom_name[i].clone(),
                    element: mol.element[i].clone(),
                    pos,
                });
            }
        }
        Ok(atoms)
    }

    /// The vectors from the selected atom to its bonded partner matching
    /// `attached_atom`, one per model. Lookup failures are reported as a
    /// warning rather than an error.
    pub fn bond_vectors(
        &mut self,
        attached_atom: &str,
        model: Option<i64>,
        selection: &Selection,
    ) -> Result<BondVectors> {
        let indices = self.model_indices(model);
        let Some(&first_index) = indices.first() else {
            return Err(RelaxError::NoPdb);
        };
        if indices.len() > 1 {
            self.validate_models()?;
        }

        let base = self.models[first_index]
            .mol
            .iter()
            .enumerate()
            .filter(|(_, mol)| selection.contains_mol(mol.mol_name.as_deref()))
            .find_map(|(m, mol)| (0..mol.len()).find(|&i| selected(selection, mol, i)).map(|i| (m, i)));
        let Some((mol_index, index)) = base else {
            return Ok(BondVectors {
                warning: Some("Cannot find the atom in the structure".to_string()),
                ..BondVectors::default()
            });
        };

        let mol = &mut self.models[first_index].mol[mol_index];
        let bonded = match bonds::bonded_atom(mol, index, attached_atom) {
            Ok(bonded) => bonded,
            Err(err) => {
                return Ok(BondVectors {
                    warning: Some(err.to_string()),
                    ..BondVectors::default()
                });
            }
        };
        let attached_name = mol.atom_name[bonded].clone();

        let vectors = indices
            .iter()
            .map(|&m| {
                let mol = self.models[m].mol.get(mol_index).ok_or_else(|| {
                    RelaxError::Structure(format!(
                        "The molecule {} is missing from model {}.",
                        mol_index + 1,
                        model_label(self.models[m].num)
                    ))
                })?;
                Ok(mol.pos(bonded) - mol.pos(index))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BondVectors {
            vectors,
            attached_name,
            warning: None,
        })
    }

    /// The one letter sequence of the amino acids of the named molecule.
    pub fn one_letter_codes(&self, mol_name: &str) -> Result<String> {
        let model = self.models.first().ok_or(RelaxError::NoPdb)?;
        let index = model.mol_index(mol_name).ok_or_else(|| {
            RelaxError::Structure(format!("The molecule '{mol_name}' cannot be found."))
        })?;
        Ok(model.mol[index]
            .residues()
            .into_iter()
            .filter_map(|(_, name)| name.and_then(crate::core::constants::one_letter_code))
            .collect())
    }

    /// The number of molecules per model, after checking all models agree.
    pub fn num_molecules(&self) -> Result<usize> {
        self.validate()?;
        Ok(self.models.first().map_or(0, |m| m.mol.len()))
    }

    /// Checks that every model holds the same molecules and atoms as the
    /// first model.
    pub fn validate_models(&self) -> Result<()> {
        let Some(first) = self.models.first() else {
            return Ok(());
        };
        for model in &self.models[1..] {
            let num = model_label(model.num);
            if model.mol.len() != first.mol.len() {
                return Err(RelaxError::Structure(format!(
                    "The number of molecules, {}, in model {} does not match the {} molecules of the first model.",
                    model.mol.len(),
                    num,
                    first.mol.len()
                )));
            }
            for (mol, first_mol) in model.mol.iter().zip(&first.mol) {
                if mol.mol_name != first_mol.mol_name {
                    return Err(RelaxError::Structure(format!(
                        "The molecule name '{}' of model {} does not match the name '{}' of the first model.",
                        mol_label(mol.mol_name.as_deref()),
                        num,
                        mol_label(first_mol.mol_name.as_deref())
                    )));
                }
                if mol.len() != first_mol.len() {
                    return Err(RelaxError::Structure(format!(
                        "The number of atoms, {}, in model {} does not match the {} atoms of the first model.",
                        mol.len(),
                        num,
                        first_mol.len()
                    )));
                }
                for i in 0..mol.len() {
                    if mol.atom_signature(i) != first_mol.atom_signature(i) {
                        debug!(
                            "Atom {i} of model {num}: {:?} differs from {:?}",
                            mol.atom_signature(i),
                            first_mol.atom_signature(i)
                        );
                        return Err(RelaxError::Structure(format!(
                            "The atoms of model {num} do not match the first model."
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks the molecule counts and names of all models.
    pub fn validate(&self) -> Result<()> {
        let Some(first) = self.models.first() else {
            return Ok(());
        };
        for model in &self.models[1..] {
            if model.mol.len() != first.mol.len() {
                return Err(RelaxError::Structure(
                    "The structural object is not valid - the number of molecules is not the same for all models.".to_string(),
                ));
            }
            for (mol, first_mol) in model.mol.iter().zip(&first.mol) {
                if mol.mol_name != first_mol.mol_name {
                    return Err(RelaxError::Structure(format!(
                        "The molecule name '{}' of model {} does not match the name '{}' of the first model.",
                        mol_label(mol.mol_name.as_deref()),
                        model_label(model.num),
                        mol_label(first_mol.mol_name.as_deref())
                    )));
                }
            }
        }
        Ok(())
    }

    fn for_each_selected(
        &mut self,
        model: Option<i64>,
        selection: &Selection,
        mut apply: impl FnMut(&mut MolContainer, usize),
    ) {
        for m in self.model_indices(model) {
            for mol in &mut self.models[m].mol {
                if !selection.contains_mol(mol.mol_name.as_deref()) {
                    continue;
                }
                for i in 0..mol.len() {
                    if selected(selection, mol, i) {
                        apply(mol, i);
                    }
                }
            }
        }
    }

    /// Rotates the selected atoms about `origin`.
    pub fn rotate(&mut self, rotation: &Matrix3<f64>, origin: &Point3<f64>, model: Option<i64>, selection: &Selection) {
        self.for_each_selected(model, selection, |mol, i| {
            let pos = origin + rotation * (mol.pos(i) - origin);
            mol.set_pos(i, &pos);
        });
    }

    /// Shifts the selected atoms by `translation`.
    pub fn translate(&mut self, translation: &Vector3<f64>, model: Option<i64>, selection: &Selection) {
        self.for_each_selected(model, selection, |mol, i| {
            let pos = mol.pos(i) + translation;
            mol.set_pos(i, &pos);
        });
    }

    /// Deletes structural data.
    ///
    /// Without arguments everything goes; with only a model number that model
    /// is removed; with a selection the matching atoms are removed and the
    /// helices and sheets are trimmed to the residues that remain.
    pub fn delete(&mut self, model: Option<i64>, selection: Option<&Selection>) -> Result<()> {
        let Some(selection) = selection else {
            match model {
                None => {
                    self.models.clear();
                    self.helices.clear();
                    self.sheets.clear();
                }
                Some(num) => {
                    let index = self.model_position(Some(num)).ok_or_else(|| {
                        RelaxError::Structure(format!("The model {num} does not exist."))
                    })?;
                    self.models.remove(index);
                }
            }
            return Ok(());
        };

        let mut res_data: BTreeMap<i64, Option<String>> = BTreeMap::new();
        let mut deleted_res: BTreeSet<i64> = BTreeSet::new();
        for m in self.model_indices(model) {
            for mol in &mut self.models[m].mol {
                if !selection.contains_mol(mol.mol_name.as_deref()) {
                    continue;
                }
                for (num, name) in mol.res_num.iter().zip(&mol.res_name) {
                    if let Some(num) = num {
                        res_data.insert(*num, name.clone());
                    }
                }
                let doomed: Vec<usize> = (0..mol.len()).filter(|&i| selected(selection, mol, i)).collect();
                let touched: BTreeSet<i64> = doomed.iter().filter_map(|&i| mol.res_num[i]).collect();
                for &i in doomed.iter().rev() {
                    mol.atom_remove(i);
                }
                deleted_res.extend(touched.into_iter().filter(|r| !mol.res_num.contains(&Some(*r))));

                if mol.len() == 0 {
                    mol.file_name = None;
                    mol.file_path = None;
                    mol.file_mol_num = None;
                    mol.file_model = None;
                }
            }
        }

        if !deleted_res.is_empty() {
            self.helices.retain_mut(|h| trim_helix(h, &deleted_res, &res_data));
            self.sheets.retain_mut(|s| trim_sheet(s, &deleted_res, &res_data));
        }
        Ok(())
    }

    /// Renumbers a model. Without `model_orig` only a single model may exist.
    pub fn set_model(&mut self, model_orig: Option<i64>, model_new: i64) -> Result<()> {
        let index = match model_orig {
            None if self.models.len() > 1 => {
                return Err(RelaxError::Structure(format!(
                    "If the original model number is not supplied, only one model in the current structural object is allowed, but {} were found.",
                    self.models.len()
                )));
            }
            None => 0,
            Some(num) => self.model_position(Some(num)).ok_or_else(|| {
                RelaxError::Structure(format!(
                    "The original model number {num} could not be found in the structural object."
                ))
            })?,
        };
        let model = self.models.get_mut(index).ok_or(RelaxError::NoPdb)?;
        model.num = Some(model_new);
        Ok(())
    }

    /// Keeps only `model_num`, renumbered to `model_to`.
    pub fn collapse_ensemble(&mut self, model_num: i64, model_to: i64) -> Result<()> {
        if self.get_model(model_num).is_none() {
            return Err(RelaxError::Structure(format!(
                "The model {model_num} does not exist."
            )));
        }
        self.models.retain(|m| m.num == Some(model_num));
        self.set_model(None, model_to)
    }

    /// Replaces the ensemble by a single unnumbered model holding the mean
    /// atomic positions.
    pub fn mean(&mut self) -> Result<()> {
        let first = self.models.first().ok_or(RelaxError::NoPdb)?;
        self.validate_models()?;

        let mut mean = ModelContainer::new(None);
        mean.mol = first.mol.clone();
        let n = self.models.len() as f64;
        for (mol_index, mol) in mean.mol.iter_mut().enumerate() {
            for i in 0..mol.len() {
                let sum: Vector3<f64> = self
                    .models
                    .iter()
                    .map(|m| m.mol[mol_index].pos(i).coords)
                    .sum();
                mol.set_pos(i, &Point3::from(sum / n));
            }
        }
        self.models = vec![mean];
        Ok(())
    }

    fn default_mol_names(&self, root: &str, mol_nums: &[i64], first_model: Option<i64>) -> Vec<String> {
        let num_struct = match self.models.first() {
            Some(model) if model.num == first_model => model.mol.len() as i64,
            _ => 0,
        };
        mol_nums
            .iter()
            .map(|n| format!("{root}_mol{}", n + num_struct))
            .collect()
    }

    /// Adds the molecules read from a file to the ensemble.
    fn pack_structs(&mut self, read: Vec<ReadModel>, file: &FileInfo, opts: &LoadOptions) -> Result<()> {
        if let Some(set_model_num) = &opts.set_model_num {
            if set_model_num.len() != read.len() {
                return Err(RelaxError::Structure(format!(
                    "The {} model numbers supplied do not match the {} models read.",
                    set_model_num.len(),
                    read.len()
                )));
            }
        }
        let target_nums: Vec<Option<i64>> = match &opts.set_model_num {
            Some(nums) => nums.iter().copied().map(Some).collect(),
            None => read.iter().map(|m| m.num).collect(),
        };
        let num_mols = read.first().map_or(0, |m| m.mols.len());
        if read.iter().any(|m| m.mols.len() != num_mols) {
            return Err(RelaxError::Structure(
                "The models of the file do not all contain the same number of molecules.".to_string(),
            ));
        }
        let mol_names = match &opts.set_mol_name {
            Some(names) if names.len() != num_mols => {
                return Err(RelaxError::Structure(format!(
                    "The {} molecule names supplied do not match the {} molecules read.",
                    names.len(),
                    num_mols
                )));
            }
            Some(names) => names.clone(),
            None => {
                let nums: Vec<i64> = read
                    .first()
                    .map(|m| m.mols.iter().map(|(n, _)| *n).collect())
                    .unwrap_or_default();
                self.default_mol_names(&file.root, &nums, target_nums.first().copied().flatten())
            }
        };

        for (model_read, target) in read.into_iter().zip(target_nums) {
            let index = match self.model_position(target) {
                Some(index) => index,
                None => {
                    self.models.push(ModelContainer::new(target));
                    self.models.len() - 1
                }
            };

            for ((file_mol_num, mut mol), name) in model_read.mols.into_iter().zip(&mol_names) {
                mol.mol_name = Some(name.clone());
                mol.file_name = Some(file.name.clone());
                mol.file_path = Some(file.path.clone());
                mol.file_mol_num = Some(file_mol_num);
                mol.file_model = model_read.num;

                if let Some(existing) = self.models[index].mol_index(name) {
                    if !opts.merge {
                        return Err(RelaxError::Structure(format!(
                            "The molecule '{name}' of model {} already exists.",
                            model_label(target)
                        )));
                    }
                    info!("Merging with model {} of molecule '{name}' (from the original molecule number {file_mol_num} of model {}).", model_label(target), model_label(model_read.num));
                    self.models[index].mol[existing].merge(&mol);
                    continue;
                }

                if index > 0 {
                    let position = self.models[index].mol.len();
                    if let Some(reference) = self.models[0].mol.get(position) {
                        if reference.mol_name.as_deref() != Some(name.as_str()) {
                            return Err(RelaxError::Structure(format!(
                                "The new molecule name of '{name}' in model {} does not match the corresponding molecule's name of '{}' in model {}.",
                                model_label(target),
                                mol_label(reference.mol_name.as_deref()),
                                model_label(self.models[0].num)
                            )));
                        }
                    }
                }

                info!(
                    "Adding molecule '{name}' to model {} (from the original molecule number {file_mol_num} of model {}).",
                    model_label(target),
                    model_label(model_read.num)
                );
                let model = &mut self.models[index];
                if model.mol.len() == 1 && model.mol[0].is_empty() {
                    model.mol[0] = mol;
                } else {
                    model.mol.push(mol);
                }
            }
        }
        Ok(())
    }

    /// Loads a PDB file. Returns `false`, with a warning, when no structural
    /// data could be read.
    pub fn load_pdb(&mut self, path: impl AsRef<Path>, opts: &LoadOptions) -> Result<bool> {
        let path = path.as_ref();
        let records = read_structure_file::<PdbFile>(path)?;
        let file = FileInfo::new(path);

        let wanted_mol = |mol_num: usize| opts.read_mol.as_ref().is_none_or(|r| r.contains(&mol_num));
        let wanted_chain = |chain: Option<&String>| {
            opts.read_mol.is_none()
                || chain
                    .and_then(|c| c.chars().next())
                    .and_then(chain_id_to_mol_index)
                    .is_some_and(|index| wanted_mol(index + 1))
        };

        let mut read = Vec::new();
        for (model_index, model) in records.models.iter().enumerate() {
            if let Some(read_model) = &opts.read_model {
                if !model.num.is_some_and(|n| read_model.contains(&n)) {
                    continue;
                }
            }

            let mut mols = Vec::new();
            for molecule in model.molecules.iter().filter(|m| wanted_mol(m.num)) {
                mols.push((molecule.num as i64, mol_from_pdb(&molecule.atoms, opts.alt_loc)?));
            }

            for conect in &records.conect {
                let Some((m, i)) = mols
                    .iter()
                    .enumerate()
                    .find_map(|(m, (_, mol))| mol.atom_index(conect.serial).map(|i| (m, i)))
                else {
                    if model_index == 0 && opts.read_mol.is_none() {
                        warn!(
                            "The atom number {} from the CONECT record cannot be found within the ATOM and HETATM records.",
                            conect.serial
                        );
                    }
                    continue;
                };
                let mol = &mut mols[m].1;
                for &serial in &conect.bonded {
                    match mol.atom_index(serial) {
                        Some(j) => mol.atom_connect(i, j),
                        None if model_index == 0 => warn!(
                            "The atom number {serial} from the CONECT record cannot be found within the ATOM and HETATM records."
                        ),
                        None => {}
                    }
                }
            }

            if !mols.is_empty() {
                read.push(ReadModel { num: model.num, mols });
            }
        }

        if read.is_empty() {
            warn!(
                "No structural data could be read from the file '{}'.",
                path.display()
            );
            return Ok(false);
        }

        self.helices.extend(
            records
                .helices
                .into_iter()
                .filter(|h| {
                    wanted_chain(h.init_chain_id.as_ref()) && wanted_chain(h.end_chain_id.as_ref())
                }),
        );
        self.sheets.extend(
            records
                .sheets
                .into_iter()
                .filter(|s| {
                    wanted_chain(s.init_chain_id.as_ref()) && wanted_chain(s.end_chain_id.as_ref())
                }),
        );
        self.pack_structs(read, &file, opts)?;
        Ok(true)
    }

    /// Loads an XYZ file. A single structure is unnumbered, several are
    /// numbered from 1.
    pub fn load_xyz(&mut self, path: impl AsRef<Path>, opts: &LoadOptions) -> Result<bool> {
        let path = path.as_ref();
        let models = read_structure_file::<XyzFile>(path)?;
        let file = FileInfo::new(path);
        let numbered = models.len() > 1;

        let mut read = Vec::new();
        for (i, atoms) in models.into_iter().enumerate() {
            let position = i as i64 + 1;
            if opts.read_model.as_ref().is_some_and(|r| !r.contains(&position)) {
                continue;
            }
            let mut mol = MolContainer::default();
            for (index, atom) in atoms.into_iter().enumerate() {
                mol.atom_add(AtomData {
                    atom_num: Some(index as i64 + 1),
                    atom_name: Some(atom.element.clone()),
                    element: Some(atom.element),
                    pos: [atom.pos.x, atom.pos.y, atom.pos.z],
                    ..AtomData::default()
                });
            }
            read.push(ReadModel {
                num: numbered.then_some(position),
                mols: vec![(1, mol)],
            });
        }

        if read.is_empty() {
            warn!("No structural data could be read from the file '{}'.", path.display());
            return Ok(false);
        }
        self.pack_structs(read, &file, opts)?;
        Ok(true)
    }

    /// Loads the final geometry of a Gaussian log file.
    pub fn load_gaussian(&mut self, path: impl AsRef<Path>, opts: &LoadOptions) -> Result<bool> {
        let path = path.as_ref();
        let atoms = read_structure_file::<GaussianLog>(path)?;
        let file = FileInfo::new(path);

        let mut mol = MolContainer::default();
        for atom in atoms {
            mol.atom_add(AtomData {
                atom_num: Some(atom.center),
                atom_name: Some(atom.element.to_string()),
                element: Some(atom.element.to_string()),
                pos: [atom.pos.x, atom.pos.y, atom.pos.z],
                ..AtomData::default()
            });
        }
        self.pack_structs(
            vec![ReadModel {
                num: None,
                mols: vec![(1, mol)],
            }],
            &file,
            opts,
        )?;
        Ok(true)
    }

    /// Appends the `<structure>` element to `parent`.
    pub fn to_xml(&self, parent: &mut XmlElement) {
        let mut element = XmlElement::new("structure").with_attribute("desc", "Structural information");
        element
            .children
            .extend(self.models.iter().map(ModelContainer::to_xml));
        if !self.helices.is_empty() {
            let helices = PyValue::List(self.helices.iter().map(Helix::to_py).collect());
            object_to_xml(&mut element, "helices", &helices);
        }
        if !self.sheets.is_empty() {
            let sheets = PyValue::List(self.sheets.iter().map(Sheet::to_py).collect());
            object_to_xml(&mut element, "sheets", &sheets);
        }
        parent.children.push(element);
    }

    pub fn from_xml(element: &XmlElement) -> Result<Internal> {
        let mut structure = Internal::new();
        for model in element.children_named("model") {
            structure.models.push(ModelContainer::from_xml(model)?);
        }
        if let Some(helices) = element.child("helices") {
            for helix in read_value(helices)?.to_list("helices")? {
                structure.helices.push(Helix::from_py(helix)?);
            }
        }
        if let Some(sheets) = element.child("sheets") {
            for sheet in read_value(sheets)?.to_list("sheets")? {
                structure.sheets.push(Sheet::from_py(sheet)?);
            }
        }
        Ok(structure)
    }
}
