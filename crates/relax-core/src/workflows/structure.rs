use crate::core::error::{RelaxError, Result};
use crate::core::io::traits::StructureWriter;
use crate::core::models::selection::parse_optional;
use crate::core::store::DataStore;
use crate::core::structure::{CentreType, Displacement, Internal, LoadOptions, PdbWriteOptions, PdbWriter, SuperimposeMethod};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, instrument, warn};

/// The structure file formats that can be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StructureFormat {
    #[default]
    Pdb,
    Xyz,
    Gaussian,
}

impl fmt::Display for StructureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StructureFormat::Pdb => "pdb",
            StructureFormat::Xyz => "xyz",
            StructureFormat::Gaussian => "gaussian",
        })
    }
}

impl FromStr for StructureFormat {
    type Err = RelaxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pdb" => Ok(StructureFormat::Pdb),
            "xyz" => Ok(StructureFormat::Xyz),
            "gaussian" | "log" => Ok(StructureFormat::Gaussian),
            _ => Err(RelaxError::InvalidData(format!(
                "The structure file format '{s}' is unknown, it must be one of 'pdb', 'xyz' or 'gaussian'."
            ))),
        }
    }
}

/// Loads a structure file into the structural object of the current pipe,
/// creating the object on first use. Returns `false` when the file held no
/// structural data.
#[instrument(skip_all, name = "structure_load", fields(format = %format))]
pub fn load(store: &mut DataStore, path: impl AsRef<Path>, format: StructureFormat, opts: &LoadOptions) -> Result<bool> {
    let path = path.as_ref();
    let pipe = store.current_mut()?;
    let structure = pipe.structure.get_or_insert_with(Internal::new);
    let loaded = match format {
        StructureFormat::Pdb => structure.load_pdb(path, opts)?,
        StructureFormat::Xyz => structure.load_xyz(path, opts)?,
        StructureFormat::Gaussian => structure.load_gaussian(path, opts)?,
    };
    if loaded {
        info!(
            path = %path.display(),
            models = structure.num_models(),
            "Loaded the structure"
        );
    } else {
        warn!("No structural data could be read from '{}'.", path.display());
    }
    Ok(loaded)
}

fn structure(store: &DataStore) -> Result<&Internal> {
    store
        .current()?
        .structure
        .as_ref()
        .filter(|s| !s.empty())
        .ok_or(RelaxError::NoPdb)
}

fn structure_mut(store: &mut DataStore) -> Result<&mut Internal> {
    store
        .current_mut()?
        .structure
        .as_mut()
        .filter(|s| !s.empty())
        .ok_or(RelaxError::NoPdb)
}

/// Superimposes the models of the current structure over the atoms of
/// `atom_id`.
pub fn superimpose(
    store: &mut DataStore,
    models: Option<&[i64]>,
    atom_id: Option<&str>,
    method: SuperimposeMethod,
    centre_type: CentreType,
) -> Result<Vec<Displacement>> {
    let selection = parse_optional(atom_id)?;
    structure_mut(store)?.superimpose(models, &selection, method, centre_type)
}

/// Replaces the ensemble by its mean structure.
pub fn mean(store: &mut DataStore) -> Result<()> {
    structure_mut(store)?.mean()
}

pub fn rmsd(store: &DataStore, atom_id: Option<&str>) -> Result<f64> {
    let selection = parse_optional(atom_id)?;
    let rmsd = structure(store)?.rmsd(&selection)?;
    info!("The RMSD is {rmsd:.3} Angstrom.");
    Ok(rmsd)
}

/// Writes the structure of the current pipe as a PDB file. An existing file
/// is only replaced with `force`.
#[instrument(skip_all, name = "structure_write_pdb")]
pub fn write_pdb(store: &DataStore, path: impl AsRef<Path>, model_num: Option<i64>, force: bool) -> Result<()> {
    let path = path.as_ref();
    if path.exists() && !force {
        return Err(RelaxError::General(format!(
            "The file '{}' already exists.  Set the force flag to overwrite.",
            path.display()
        )));
    }
    let options = PdbWriteOptions {
        model_num,
        ..PdbWriteOptions::default()
    };
    let structure = structure(store)?;
    PdbWriter::check_fields(structure, &options)?;
    PdbWriter::write_to_path(structure, &options, path)?;
    info!(path = %path.display(), "Wrote the PDB file");
    Ok(())
}
