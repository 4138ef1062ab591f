//! Writing the structural object as a PDB v3.30 file.

use super::containers::MolContainer;
use super::internal::Internal;
use crate::core::constants::{CHAIN_ID_LIST, het_name, is_skipped_het};
use crate::core::error::{RelaxError, Result};
use crate::core::io::pdb_write::{self, AtomFields, MasterCounts};
use crate::core::io::traits::StructureWriter;
use crate::core::utils::time;
use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct PdbWriteOptions {
    /// Only write this model. All models are written when `None`.
    pub model_num: Option<i64>,
    /// The creation time written to REMARK 40, the current time when unset.
    pub timestamp: Option<String>,
}

pub struct PdbWriter;

/// The coordinate range the `%8.3f` columns of an atom record can hold.
const COORD_RANGE: std::ops::Range<f64> = -999.9995..9999.9995;
const MAX_SERIAL: usize = 99_999;
const RES_SEQ_RANGE: std::ops::RangeInclusive<i64> = -999..=9999;

/// One heterogen group: a run of HETATM records sharing a residue number.
#[derive(Debug, Clone, PartialEq)]
struct HetGroup {
    res_num: Option<i64>,
    res_name: String,
    chain_id: char,
    num_atoms: usize,
    /// Element counts in order of first appearance.
    elements: Vec<(String, usize)>,
}

impl HetGroup {
    fn formula(&self) -> String {
        self.elements
            .iter()
            .map(|(element, count)| format!("{element}{count}"))
            .collect()
    }
}

fn chain_id(mol_index: usize) -> Result<char> {
    CHAIN_ID_LIST.chars().nth(mol_index).ok_or_else(|| {
        RelaxError::Structure(format!(
            "Only {} molecules can be written to a PDB file.",
            CHAIN_ID_LIST.len()
        ))
    })
}

fn record_type(mol: &MolContainer, index: usize) -> &str {
    mol.pdb_record[index].as_deref().unwrap_or("ATOM")
}

/// Collects the heterogen groups of one molecule. Water is skipped.
fn het_groups(mol: &MolContainer, chain_id: char) -> Vec<HetGroup> {
    let mut groups: Vec<HetGroup> = Vec::new();
    for i in 0..mol.len() {
        if record_type(mol, i) != "HETATM" {
            continue;
        }
        let Some(res_name) = mol.res_name[i].as_deref() else {
            continue;
        };
        if is_skipped_het(res_name) {
            continue;
        }

        let res_num = mol.res_num[i];
        if groups.last().is_none_or(|group| group.res_num != res_num) {
            groups.push(HetGroup {
                res_num,
                res_name: res_name.to_string(),
                chain_id,
                num_atoms: 0,
                elements: Vec::new(),
            });
        }
        if let Some(group) = groups.last_mut() {
            group.num_atoms += 1;
            let element = mol.element[i].clone().unwrap_or_default();
            match group.elements.iter_mut().find(|(e, _)| *e == element) {
                Some((_, count)) => *count += 1,
                None => group.elements.push((element, 1)),
            }
        }
    }
    groups
}

fn atom_fields<'a>(mol: &'a MolContainer, index: usize, serial: i64, chain_id: char) -> AtomFields<'a> {
    AtomFields {
        serial: Some(serial),
        name: mol.atom_name[index].as_deref().unwrap_or(""),
        alt_loc: None,
        res_name: mol.res_name[index].as_deref(),
        chain_id: Some(chain_id),
        res_seq: mol.res_num[index],
        icode: None,
        x: mol.x[index],
        y: mol.y[index],
        z: mol.z[index],
        occupancy: 1.0,
        temp_factor: 0.0,
        element: mol.element[index].as_deref(),
        charge: None,
    }
}

impl PdbWriter {
    /// Checks that every value of the models to be written fits its fixed
    /// width PDB column, so that a failure never leaves a partial file.
    pub fn check_fields(structure: &Internal, options: &PdbWriteOptions) -> Result<()> {
        for (model_index, model) in structure.model_loop(options.model_num).iter().enumerate() {
            let label = model.num.unwrap_or(model_index as i64 + 1);
            if model.mol.len() > CHAIN_ID_LIST.len() {
                chain_id(model.mol.len() - 1)?;
            }

            let mut serials = 0;
            for mol in &model.mol {
                let num_atom = (0..mol.len()).filter(|&i| record_type(mol, i) == "ATOM").count();
                serials += mol.len() + usize::from(num_atom > 0);

                for i in 0..mol.len() {
                    for (axis, value) in [("x", mol.x[i]), ("y", mol.y[i]), ("z", mol.z[i])] {
                        if !COORD_RANGE.contains(&value) {
                            return Err(RelaxError::Structure(format!(
                                "The {axis} coordinate {value} of the atom '{}' in model {label} cannot be written to a PDB file, it must lie between -999.999 and 9999.999.",
                                mol.atom_name[i].as_deref().unwrap_or("None")
                            )));
                        }
                    }
                    if let Some(res_num) = mol.res_num[i].filter(|n| !RES_SEQ_RANGE.contains(n)) {
                        return Err(RelaxError::Structure(format!(
                            "The residue number {res_num} in model {label} does not fit the four PDB residue sequence columns."
                        )));
                    }
                }
            }
            if serials > MAX_SERIAL {
                return Err(RelaxError::Structure(format!(
                    "Model {label} needs {serials} atom serial numbers, more than the {MAX_SERIAL} a PDB file allows."
                )));
            }
        }
        Ok(())
    }
}

impl StructureWriter for PdbWriter {
    type Source = Internal;
    type Options = PdbWriteOptions;
    type Error = RelaxError;

    fn write_to(
        structure: &Internal,
        options: &PdbWriteOptions,
        writer: &mut impl Write,
    ) -> Result<()> {
        structure.validate()?;
        if structure.empty() {
            return Err(RelaxError::NoPdb);
        }
        let models = structure.model_loop(options.model_num);
        let Some(first) = models.first().copied() else {
            return Err(RelaxError::Structure(format!(
                "The model {} does not exist.",
                options.model_num.map_or("None".to_string(), |n| n.to_string())
            )));
        };
        Self::check_fields(structure, options)?;
        let model_records = structure.models().iter().any(|m| m.num.is_some());
        debug!(models = models.len(), "Writing the PDB file");

        // Title section.
        let created = options.timestamp.clone().unwrap_or_else(time::now);
        pdb_write::remark(writer, 4, Some("This file complies with format v. 3.30, Jul-2011."))?;
        pdb_write::remark(writer, 40, None)?;
        pdb_write::remark(writer, 40, Some("Created using relax (http://www.nmr-relax.com)."))?;
        pdb_write::remark(writer, 40, None)?;
        pdb_write::remark(
            writer,
            40,
            Some(&format!("relax version {}.", env!("CARGO_PKG_VERSION"))),
        )?;
        pdb_write::remark(writer, 40, Some(&format!("Created on {created}.")))?;

        // Heterogen section, from the first model.
        let mut het_data: Vec<HetGroup> = Vec::new();
        for (index, mol) in first.mol.iter().enumerate() {
            let chain = chain_id(index)?;
            for group in het_groups(mol, chain) {
                if !het_data
                    .iter()
                    .any(|g| g.res_num == group.res_num && g.chain_id == group.chain_id)
                {
                    het_data.push(group);
                }
            }
        }
        for group in &het_data {
            pdb_write::het(writer, &group.res_name, Some(group.chain_id), group.res_num, group.num_atoms)?;
        }
        let mut named = BTreeSet::new();
        for group in &het_data {
            if named.insert(group.res_name.as_str()) {
                pdb_write::hetnam(writer, &group.res_name, het_name(&group.res_name))?;
            }
        }
        let mut formulae = BTreeSet::new();
        for (i, group) in het_data.iter().enumerate() {
            if formulae.insert(group.res_name.as_str()) {
                pdb_write::formul(writer, i + 1, &group.res_name, &group.formula())?;
            }
        }

        // Secondary structure section.
        for (i, helix) in structure.helices.iter().enumerate() {
            pdb_write::helix(writer, i + 1, helix)?;
        }
        for sheet in &structure.sheets {
            pdb_write::sheet(writer, sheet)?;
        }

        // Coordinate section.
        let mut num_coord = 0;
        let mut num_ter = 0;
        let mut serials: HashMap<(usize, usize), i64> = HashMap::new();
        for (model_index, model) in models.iter().enumerate() {
            if model_records {
                pdb_write::model(writer, model.num.unwrap_or(model_index as i64 + 1))?;
            }

            let mut serial = 0;
            num_coord = 0;
            num_ter = 0;
            for (index, mol) in model.mol.iter().enumerate() {
                let chain = chain_id(index)?;

                let mut last_atom = None;
                for i in (0..mol.len()).filter(|&i| record_type(mol, i) == "ATOM") {
                    serial += 1;
                    serials.entry((index, i)).or_insert(serial);
                    pdb_write::atom(writer, &atom_fields(mol, i, serial, chain))?;
                    num_coord += 1;
                    last_atom = Some(i);
                }
                if let Some(i) = last_atom {
                    serial += 1;
                    pdb_write::ter(writer, serial, mol.res_name[i].as_deref(), Some(chain), mol.res_num[i])?;
                    num_ter += 1;
                }

                for i in (0..mol.len()).filter(|&i| record_type(mol, i) == "HETATM") {
                    serial += 1;
                    serials.entry((index, i)).or_insert(serial);
                    pdb_write::hetatm(writer, &atom_fields(mol, i, serial, chain))?;
                    num_coord += 1;
                }
            }

            if model_records {
                pdb_write::endmdl(writer)?;
            }
        }

        // Connectivity section, from the first model.
        let mut num_conect = 0;
        for (index, mol) in first.mol.iter().enumerate() {
            for i in 0..mol.len() {
                if mol.bonded[i].is_empty() {
                    continue;
                }
                let Some(&serial) = serials.get(&(index, i)) else {
                    warn!(atom = i, "Skipping the CONECT record of an unwritten atom");
                    continue;
                };
                let bonded: Vec<i64> = mol.bonded[i]
                    .iter()
                    .filter_map(|&b| serials.get(&(index, b)).copied())
                    .collect();
                for chunk in bonded.chunks(4) {
                    pdb_write::conect(writer, serial, chunk)?;
                    num_conect += 1;
                }
            }
        }

        pdb_write::master(
            writer,
            &MasterCounts {
                num_remark: 2,
                num_het: het_data.len(),
                num_helix: structure.helices.len(),
                num_sheet: structure.sheets.len(),
                num_coord,
                num_ter,
                num_conect,
                ..MasterCounts::default()
            },
        )?;
        pdb_write::end(writer)?;
        Ok(())
    }
}

impl Internal {
    /// Writes all models, or only `model_num`, as a PDB file stamped with the
    /// current time.
    pub fn write_pdb(&self, writer: &mut impl Write, model_num: Option<i64>) -> Result<()> {
        PdbWriter::write_to(
            self,
            &PdbWriteOptions {
                model_num,
                timestamp: None,
            },
            writer,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::structure::containers::AtomData;
    use crate::core::structure::internal::LoadOptions;
    use tempfile::Builder;

    fn atom(name: &str, element: &str, res: (i64, &str), record: &str, pos: [f64; 3]) -> AtomData {
        AtomData {
            atom_name: Some(name.to_string()),
            res_num: Some(res.0),
            res_name: Some(res.1.to_string()),
            element: Some(element.to_string()),
            pdb_record: Some(record.to_string()),
            pos,
            ..AtomData::default()
        }
    }

    fn options() -> PdbWriteOptions {
        PdbWriteOptions {
            model_num: None,
            timestamp: Some("Sat Oct 17 09:30:00 2026".to_string()),
        }
    }

    fn protein_with_ligand() -> Internal {
        let mut structure = Internal::new();
        structure.add_molecule("prot").unwrap();
        for (name, element, pos) in [
            ("N", "N", [0.0, 0.0, 0.0]),
            ("H", "H", [0.0, 1.0, 0.0]),
            ("CA", "C", [1.46, 0.0, 0.0]),
            ("C", "C", [2.0, 1.4, 0.0]),
        ] {
            structure
                .add_atom(Some("prot"), atom(name, element, (1, "GLY"), "ATOM", pos), None)
                .unwrap();
        }
        structure.connect_atom(Some("prot"), 0, 1).unwrap();
        structure.connect_atom(Some("prot"), 0, 2).unwrap();
        structure.connect_atom(Some("prot"), 2, 3).unwrap();
        for (name, element, pos) in [
            ("C1", "C", [5.0, 0.0, 0.0]),
            ("O1", "O", [6.2, 0.0, 0.0]),
            ("O2", "O", [4.4, 1.0, 0.0]),
        ] {
            structure
                .add_atom(Some("prot"), atom(name, element, (900, "CO2"), "HETATM", pos), None)
                .unwrap();
        }
        structure
            .add_atom(Some("prot"), atom("O", "O", (901, "HOH"), "HETATM", [9.0, 9.0, 9.0]), None)
            .unwrap();
        structure.connect_atom(Some("prot"), 4, 5).unwrap();
        structure.connect_atom(Some("prot"), 4, 6).unwrap();
        structure
    }

    fn written(structure: &Internal, options: &PdbWriteOptions) -> String {
        let mut buffer = Vec::new();
        PdbWriter::write_to(structure, options, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn records<'a>(text: &'a str, name: &str) -> Vec<&'a str> {
        text.lines()
            .filter(|line| line[..6].trim_end() == name)
            .collect()
    }

    #[test]
    fn every_record_is_80_columns() {
        let text = written(&protein_with_ligand(), &options());
        for line in text.lines() {
            assert_eq!(line.chars().count(), 80, "Bad record width: {line:?}");
        }
        assert!(text.lines().last().unwrap().starts_with("END"));
    }

    #[test]
    fn title_remarks_carry_version_and_time() {
        let text = written(&protein_with_ligand(), &options());
        let remarks = records(&text, "REMARK");
        assert_eq!(remarks.len(), 6);
        assert!(remarks[0].contains("THIS FILE COMPLIES WITH FORMAT V. 3.30, JUL-2011."));
        assert!(remarks[5].contains("CREATED ON SAT OCT 17 09:30:00 2026."));
    }

    #[test]
    fn heterogens_skip_water_and_list_formulae() {
        let text = written(&protein_with_ligand(), &options());
        let het = records(&text, "HET");
        assert_eq!(het.len(), 1);
        assert_eq!(&het[0][7..10], "CO2");
        assert_eq!(&het[0][12..13], "A");
        assert_eq!(het[0][13..17].trim(), "900");
        assert_eq!(het[0][20..25].trim(), "3");

        let formul = records(&text, "FORMUL");
        assert_eq!(formul.len(), 1);
        assert!(formul[0][19..].starts_with("C1O2"));
        assert!(records(&text, "HETNAM")[0].contains("UNKNOWN"));
    }

    #[test]
    fn ter_follows_the_atoms_and_conect_uses_written_serials() {
        let text = written(&protein_with_ligand(), &options());
        let ter = records(&text, "TER");
        assert_eq!(ter.len(), 1);
        assert_eq!(ter[0][6..11].trim(), "5");

        let hetatm = records(&text, "HETATM");
        assert_eq!(hetatm[0][6..11].trim(), "6");

        let conect = records(&text, "CONECT");
        assert_eq!(conect[0][6..31].split_whitespace().collect::<Vec<_>>(), ["1", "2", "3"]);
        let ligand = conect.iter().find(|l| l[6..11].trim() == "6").unwrap();
        assert_eq!(ligand[11..].split_whitespace().collect::<Vec<_>>(), ["7", "8"]);

        let master = records(&text, "MASTER")[0];
        assert_eq!(master[50..55].trim(), "8", "Eight coordinate records");
        assert_eq!(master[55..60].trim(), "1", "One TER record");
    }

    #[test]
    fn model_records_wrap_each_numbered_model() {
        let mut structure = Internal::new();
        structure.add_model(Some(1), None).unwrap();
        structure.add_model(Some(2), None).unwrap();
        structure.add_molecule("ion").unwrap();
        structure
            .add_atom(
                Some("ion"),
                atom("NA", "Na", (1, "NA"), "ATOM", [0.0; 3]),
                Some(&[[0.0; 3], [1.0, 1.0, 1.0]]),
            )
            .unwrap();

        let text = written(&structure, &options());
        assert_eq!(records(&text, "MODEL").len(), 2);
        assert_eq!(records(&text, "ENDMDL").len(), 2);

        let only_second = written(
            &structure,
            &PdbWriteOptions {
                model_num: Some(2),
                ..options()
            },
        );
        let models = records(&only_second, "MODEL");
        assert_eq!(models.len(), 1);
        assert_eq!(models[0][10..14].trim(), "2");
        assert_eq!(records(&only_second, "ATOM")[0][30..38].trim(), "1.000");
    }

    #[test]
    fn missing_model_and_empty_structure_are_errors() {
        let err = PdbWriter::write_to(&Internal::new(), &options(), &mut Vec::new()).unwrap_err();
        assert!(matches!(err, RelaxError::NoPdb));

        let err = PdbWriter::write_to(
            &protein_with_ligand(),
            &PdbWriteOptions {
                model_num: Some(5),
                ..options()
            },
            &mut Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "The model 5 does not exist.");
    }

    #[test]
    fn out_of_range_fields_fail_before_any_output() {
        let mut far = protein_with_ligand();
        far.add_atom(Some("prot"), atom("CB", "C", (1, "GLY"), "ATOM", [0.0, -1000.0, 0.0]), None)
            .unwrap();
        let mut buffer = Vec::new();
        let err = PdbWriter::write_to(&far, &options(), &mut buffer).unwrap_err();
        assert!(err.to_string().starts_with("The y coordinate -1000 of the atom 'CB'"));
        assert!(buffer.is_empty());

        let mut large = protein_with_ligand();
        large
            .add_atom(Some("prot"), atom("CB", "C", (1, "GLY"), "ATOM", [10000.0, 0.0, 0.0]), None)
            .unwrap();
        assert!(PdbWriter::check_fields(&large, &options()).is_err());

        let mut renumbered = protein_with_ligand();
        renumbered
            .add_atom(Some("prot"), atom("CB", "C", (10000, "GLY"), "ATOM", [0.0; 3]), None)
            .unwrap();
        let err = PdbWriter::check_fields(&renumbered, &options()).unwrap_err();
        assert!(err.to_string().contains("residue number 10000"));

        PdbWriter::check_fields(&protein_with_ligand(), &options()).unwrap();
    }

    #[test]
    fn written_files_load_back() {
        let structure = protein_with_ligand();
        let file = Builder::new().suffix(".pdb").tempfile().unwrap();
        PdbWriter::write_to_path(&structure, &options(), file.path()).unwrap();

        let mut loaded = Internal::new();
        assert!(loaded.load_pdb(file.path(), &LoadOptions::default()).unwrap());
        let mol = &loaded.models()[0].mol[0];
        assert_eq!(mol.len(), 8);
        assert_eq!(mol.atom_name[6].as_deref(), Some("O2"));
        assert_eq!(mol.bonded[4], vec![5, 6]);
    }
}
