//! Navigation and construction of the molecule → residue → spin tree of a
//! data pipe.

use crate::core::error::{RelaxError, Result};
use crate::core::models::mol_res_spin::{
    MoleculeContainer, ResidueContainer, SpinContainer, generate_spin_id,
};
use crate::core::models::pipe::PipeContainer;
use crate::core::models::selection::Selection;
use crate::core::structure::MolType;
use tracing::{debug, warn};

/// A spin with the identity of its molecule and residue.
#[derive(Debug, Clone, Copy)]
pub struct SpinView<'a> {
    pub mol_name: Option<&'a str>,
    pub res_num: Option<i64>,
    pub res_name: Option<&'a str>,
    pub spin: &'a SpinContainer,
}

impl SpinView<'_> {
    pub fn id(&self) -> String {
        generate_spin_id(
            self.mol_name,
            self.res_num,
            self.res_name,
            self.spin.num,
            self.spin.name.as_deref(),
        )
    }
}

/// A mutable spin with its identifier.
#[derive(Debug)]
pub struct SpinMut<'a> {
    pub id: String,
    pub res_num: Option<i64>,
    pub res_name: Option<String>,
    pub spin: &'a mut SpinContainer,
}

fn find_residue(mol: &MoleculeContainer, res_num: Option<i64>, res_name: Option<&str>) -> Option<usize> {
    mol.residues.iter().position(|res| {
        (res_num.is_none() || res.num == res_num)
            && (res_name.is_none() || res.name.as_deref() == res_name)
    })
}

fn find_spin(res: &ResidueContainer, spin_num: Option<i64>, spin_name: Option<&str>) -> Option<usize> {
    res.spins.iter().position(|spin| {
        (spin_num.is_none() || spin.num == spin_num)
            && (spin_name.is_none() || spin.name.as_deref() == spin_name)
    })
}

impl PipeContainer {
    /// True when any molecule, residue or spin exists.
    pub fn exists_mol_res_spin_data(&self) -> bool {
        self.mol
            .iter()
            .any(|mol| mol.name.is_some() || !mol.residues.is_empty())
    }

    fn mol_position(&self, name: Option<&str>) -> Option<usize> {
        match name {
            Some(name) => self.mol.iter().position(|m| m.name.as_deref() == Some(name)),
            None => (!self.mol.is_empty()).then_some(0),
        }
    }

    pub fn create_molecule(&mut self, name: Option<&str>, mol_type: Option<&str>) -> Result<&mut MoleculeContainer> {
        if let Some(name) = name {
            if self.mol.iter().any(|m| m.name.as_deref() == Some(name)) {
                return Err(RelaxError::General(format!(
                    "The molecule '{name}' already exists in the relax data store."
                )));
            }
        }
        self.mol.push(MoleculeContainer::new(name, mol_type));
        let last = self.mol.len() - 1;
        Ok(&mut self.mol[last])
    }

    pub fn create_residue(
        &mut self,
        mol_name: Option<&str>,
        res_num: Option<i64>,
        res_name: Option<&str>,
    ) -> Result<&mut ResidueContainer> {
        let mol_index = match self.mol_position(mol_name) {
            Some(index) => index,
            None if mol_name.is_none() => {
                self.create_molecule(None, None)?;
                self.mol.len() - 1
            }
            None => {
                return Err(RelaxError::General(format!(
                    "The molecule '{}' does not exist.",
                    mol_name.unwrap_or_default()
                )));
            }
        };
        let mol = &mut self.mol[mol_index];
        if let Some(num) = res_num {
            if mol.residues.iter().any(|r| r.num == Some(num)) {
                return Err(RelaxError::General(format!(
                    "The residue number '{num}' already exists in the sequence."
                )));
            }
        }
        mol.residues.push(ResidueContainer::new(res_num, res_name));
        let last = mol.residues.len() - 1;
        Ok(&mut mol.residues[last])
    }

    /// Creates a spin, adding its molecule and residue when missing.
    pub fn create_spin(
        &mut self,
        mol_name: Option<&str>,
        res_num: Option<i64>,
        res_name: Option<&str>,
        spin_num: Option<i64>,
        spin_name: Option<&str>,
    ) -> Result<&mut SpinContainer> {
        let mol_index = match self.mol_position(mol_name) {
            Some(index) => index,
            None => {
                self.create_molecule(mol_name, None)?;
                self.mol.len() - 1
            }
        };
        let res_index = match find_residue(&self.mol[mol_index], res_num, res_name) {
            Some(index) => index,
            None => {
                let mol = &mut self.mol[mol_index];
                mol.residues.push(ResidueContainer::new(res_num, res_name));
                mol.residues.len() - 1
            }
        };
        let residue = &mut self.mol[mol_index].residues[res_index];
        if residue
            .spins
            .iter()
            .any(|s| s.num == spin_num && s.name.as_deref() == spin_name)
        {
            return Err(RelaxError::General(format!(
                "The spin '{}' already exists.",
                generate_spin_id(mol_name, res_num, res_name, spin_num, spin_name)
            )));
        }
        residue.spins.push(SpinContainer::new(spin_num, spin_name));
        let last = residue.spins.len() - 1;
        Ok(&mut residue.spins[last])
    }

    /// Finds or creates each level of the tree for one sequence entry and
    /// sets the spin's selection flag.
    pub fn generate_spin(
        &mut self,
        mol_name: Option<&str>,
        res_num: Option<i64>,
        res_name: Option<&str>,
        spin_num: Option<i64>,
        spin_name: Option<&str>,
        select: bool,
    ) -> Result<&mut SpinContainer> {
        let mol_index = match self.mol.iter().position(|m| m.name.as_deref() == mol_name) {
            Some(index) => index,
            None => {
                self.create_molecule(mol_name, None)?;
                self.mol.len() - 1
            }
        };
        let mol = &mut self.mol[mol_index];
        let res_index = match find_residue(mol, res_num, res_name) {
            Some(index) => index,
            None => {
                mol.residues.push(ResidueContainer::new(res_num, res_name));
                mol.residues.len() - 1
            }
        };
        let residue = &mut mol.residues[res_index];
        let spin_index = match find_spin(residue, spin_num, spin_name) {
            Some(index) if spin_num.is_some() || spin_name.is_some() => index,
            _ => {
                residue.spins.push(SpinContainer::new(spin_num, spin_name));
                residue.spins.len() - 1
            }
        };
        let spin = &mut residue.spins[spin_index];
        spin.select = select;
        Ok(spin)
    }

    /// Every spin matching the selection, in sequence order.
    pub fn spin_loop<'a>(&'a self, selection: &Selection) -> Vec<SpinView<'a>> {
        let mut spins = Vec::new();
        for mol in &self.mol {
            if !selection.contains_mol(mol.name.as_deref()) {
                continue;
            }
            for res in &mol.residues {
                if !selection.contains_res(res.num, res.name.as_deref()) {
                    continue;
                }
                for spin in &res.spins {
                    if selection.contains_spin(spin.num, spin.name.as_deref()) {
                        spins.push(SpinView {
                            mol_name: mol.name.as_deref(),
                            res_num: res.num,
                            res_name: res.name.as_deref(),
                            spin,
                        });
                    }
                }
            }
        }
        spins
    }

    /// Mutable access to every spin matching the selection.
    pub fn spin_loop_mut(&mut self, selection: &Selection) -> Vec<SpinMut<'_>> {
        let mut spins = Vec::new();
        for mol in &mut self.mol {
            if !selection.contains_mol(mol.name.as_deref()) {
                continue;
            }
            let mol_name = mol.name.clone();
            for res in &mut mol.residues {
                if !selection.contains_res(res.num, res.name.as_deref()) {
                    continue;
                }
                for spin in &mut res.spins {
                    if selection.contains_spin(spin.num, spin.name.as_deref()) {
                        spins.push(SpinMut {
                            id: generate_spin_id(
                                mol_name.as_deref(),
                                res.num,
                                res.name.as_deref(),
                                spin.num,
                                spin.name.as_deref(),
                            ),
                            res_num: res.num,
                            res_name: res.name.clone(),
                            spin,
                        });
                    }
                }
            }
        }
        spins
    }

    /// The single spin matching `spin_id`.
    pub fn return_spin(&self, spin_id: &str) -> Result<Option<SpinView<'_>>> {
        let selection = Selection::parse(spin_id)?;
        let mut spins = self.spin_loop(&selection);
        if spins.len() > 1 {
            return Err(RelaxError::General(format!(
                "The identifier '{spin_id}' corresponds to more than a single spin."
            )));
        }
        Ok(spins.pop())
    }

    pub fn count_spins(&self, selection: &Selection) -> usize {
        self.spin_loop(selection).len()
    }

    pub fn count_selected_spins(&self, selection: &Selection) -> usize {
        self.spin_loop(selection)
            .iter()
            .filter(|view| view.spin.select)
            .count()
    }

    /// Creates a spin for every selected atom of the structural object,
    /// averaging over the models. Returns the number of spins created.
    pub fn load_spins(&mut self, spin_id: Option<&str>) -> Result<usize> {
        let selection = match spin_id {
            Some(id) => Selection::parse(id)?,
            None => Selection::all(),
        };
        let structure = self.structure.as_ref().ok_or(RelaxError::NoPdb)?;
        let atoms = structure.atom_loop(&selection, None, true)?;
        let protein: Vec<(Option<String>, bool)> = structure
            .models()
            .first()
            .map(|model| {
                model
                    .mol
                    .iter()
                    .map(|m| (m.mol_name.clone(), m.mol_type() == MolType::Protein))
                    .collect()
            })
            .unwrap_or_default();

        let mut created = 0;
        for atom in atoms {
            let mol_name = atom.mol_name.as_deref();
            if !self.mol.iter().any(|m| m.name.as_deref() == mol_name) {
                let is_protein = protein
                    .iter()
                    .any(|(name, protein)| name.as_deref() == mol_name && *protein);
                self.create_molecule(mol_name, is_protein.then_some("protein"))?;
            }

            let id = generate_spin_id(
                mol_name,
                atom.res_num,
                atom.res_name.as_deref(),
                atom.atom_num,
                atom.atom_name.as_deref(),
            );
            let exists = self
                .mol
                .iter()
                .filter(|m| m.name.as_deref() == mol_name)
                .filter_map(|m| {
                    find_residue(m, atom.res_num, atom.res_name.as_deref()).map(|r| &m.residues[r])
                })
                .any(|res| find_spin(res, atom.atom_num, atom.atom_name.as_deref()).is_some());
            if exists {
                warn!("The spin '{id}' already exists.");
                continue;
            }

            let spin = self.create_spin(
                mol_name,
                atom.res_num,
                atom.res_name.as_deref(),
                atom.atom_num,
                atom.atom_name.as_deref(),
            )?;
            spin.element = atom.element.clone();
            debug!(spin = %id, "Adding a spin from the structure");
            created += 1;
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::pipe::PipeType;
    use crate::core::structure::{AtomData, Internal};

    fn sequence() -> PipeContainer {
        let mut pipe = PipeContainer::new(PipeType::JwMapping);
        for (res_num, res_name) in [(1, "GLY"), (2, "ALA"), (3, "LEU")] {
            pipe.generate_spin(Some("Ap4Aase"), Some(res_num), Some(res_name), None, Some("N"), true)
                .unwrap();
        }
        pipe
    }

    mod building {
        use super::*;

        #[test]
        fn generate_spin_reuses_existing_containers() {
            let mut pipe = sequence();
            assert_eq!(pipe.mol.len(), 1);
            assert_eq!(pipe.mol[0].residues.len(), 3);
            pipe.generate_spin(Some("Ap4Aase"), Some(2), Some("ALA"), None, Some("N"), false)
                .unwrap();
            assert_eq!(pipe.count_spins(&Selection::all()), 3);
            assert_eq!(pipe.count_selected_spins(&Selection::all()), 2);

            pipe.generate_spin(Some("Ap4Aase"), Some(2), Some("ALA"), None, Some("H"), true)
                .unwrap();
            assert_eq!(pipe.mol[0].residues[1].spins.len(), 2);
        }

        #[test]
        fn duplicates_are_rejected() {
            let mut pipe = sequence();
            let err = pipe.create_molecule(Some("Ap4Aase"), None).unwrap_err();
            assert_eq!(
                err.to_string(),
                "The molecule 'Ap4Aase' already exists in the relax data store."
            );
            let err = pipe.create_residue(Some("Ap4Aase"), Some(1), None).unwrap_err();
            assert_eq!(err.to_string(), "The residue number '1' already exists in the sequence.");
            let err = pipe
                .create_spin(Some("Ap4Aase"), Some(1), Some("GLY"), None, Some("N"))
                .unwrap_err();
            assert_eq!(err.to_string(), "The spin '#Ap4Aase:1@N' already exists.");
            assert!(pipe.create_residue(Some("missing"), Some(1), None).is_err());
        }

        #[test]
        fn empty_pipes_have_no_sequence() {
            let mut pipe = PipeContainer::new(PipeType::JwMapping);
            assert!(!pipe.exists_mol_res_spin_data());
            pipe.create_residue(None, Some(5), Some("GLY")).unwrap();
            assert!(pipe.exists_mol_res_spin_data());
        }
    }

    mod looping {
        use super::*;

        #[test]
        fn selections_filter_the_spins() {
            let pipe = sequence();
            let views = pipe.spin_loop(&Selection::parse(":2-3").unwrap());
            let ids: Vec<String> = views.iter().map(SpinView::id).collect();
            assert_eq!(ids, vec!["#Ap4Aase:2@N", "#Ap4Aase:3@N"]);
        }

        #[test]
        fn mutable_loop_edits_in_place() {
            let mut pipe = sequence();
            for entry in pipe.spin_loop_mut(&Selection::parse(":GLY").unwrap()) {
                entry.spin.select = false;
            }
            assert!(!pipe.mol[0].residues[0].spins[0].select);
            assert!(pipe.mol[0].residues[1].spins[0].select);
        }

        #[test]
        fn return_spin_requires_a_unique_match() {
            let pipe = sequence();
            let view = pipe.return_spin(":3").unwrap().unwrap();
            assert_eq!(view.res_name, Some("LEU"));
            assert!(pipe.return_spin(":9").unwrap().is_none());
            assert!(pipe.return_spin("@N").is_err());
        }
    }

    #[test]
    fn load_spins_creates_one_spin_per_selected_atom() {
        let mut structure = Internal::new();
        structure.add_molecule("prot").unwrap();
        for (num, name, res_num, res_name) in [
            (1, "N", 1, "GLY"),
            (2, "H", 1, "GLY"),
            (3, "N", 2, "ALA"),
            (4, "H", 2, "ALA"),
        ] {
            let atom = AtomData {
                atom_num: Some(num),
                atom_name: Some(name.to_string()),
                res_num: Some(res_num),
                res_name: Some(res_name.to_string()),
                element: Some(name.to_string()),
                ..AtomData::default()
            };
            structure.add_atom(Some("prot"), atom, None).unwrap();
        }

        let mut pipe = PipeContainer::new(PipeType::JwMapping);
        assert!(matches!(pipe.load_spins(None), Err(RelaxError::NoPdb)));

        pipe.structure = Some(structure);
        assert_eq!(pipe.load_spins(Some("@N")).unwrap(), 2);
        assert_eq!(pipe.mol[0].mol_type.as_deref(), Some("protein"));
        let view = pipe.return_spin(":2@N").unwrap().unwrap();
        assert_eq!(view.spin.num, Some(3));
        assert_eq!(view.spin.element.as_deref(), Some("N"));

        assert_eq!(pipe.load_spins(Some("@N")).unwrap(), 0, "Existing spins are skipped");
        assert_eq!(pipe.load_spins(None).unwrap(), 2);
    }
}
