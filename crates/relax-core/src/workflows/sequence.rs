use crate::core::constants::gyromagnetic_ratio;
use crate::core::error::{RelaxError, Result};
use crate::core::io::columns::{self, ColumnSpec};
use crate::core::models::selection::parse_optional;
use crate::core::store::DataStore;
use std::path::Path;
use tracing::{info, instrument, warn};

/// Reads the molecule, residue and spin sequence of the current pipe from a
/// column file.
#[instrument(skip_all, name = "sequence_read")]
pub fn read(store: &mut DataStore, path: impl AsRef<Path>, cols: &ColumnSpec) -> Result<usize> {
    columns::read_sequence(store.current_mut()?, path, cols)
}

/// Loads an R1, R2 or NOE data set measured at the proton frequency `frq`
/// (Hz) into the current pipe.
#[instrument(skip_all, name = "relax_data_read", fields(ri_id, ri_type, frq))]
pub fn read_relax_data(
    store: &mut DataStore,
    ri_id: &str,
    ri_type: &str,
    frq: f64,
    path: impl AsRef<Path>,
    cols: &ColumnSpec,
) -> Result<usize> {
    columns::read_relax_data(store.current_mut()?, ri_id, ri_type, frq, path, cols)
}

/// Sets the isotope of the selected spins. Spins with an isotope already set
/// are left untouched unless `force` is given. Returns the number of spins
/// changed.
pub fn set_isotope(store: &mut DataStore, spin_id: Option<&str>, isotope: &str, force: bool) -> Result<usize> {
    if gyromagnetic_ratio(isotope).is_none() {
        return Err(RelaxError::General(format!(
            "The isotope '{isotope}' is unknown."
        )));
    }
    let selection = parse_optional(spin_id)?;
    let pipe_name = store.current_name().unwrap_or_default().to_string();
    let pipe = store.current_mut()?;
    if !pipe.exists_mol_res_spin_data() {
        return Err(RelaxError::NoSequence { pipe: pipe_name });
    }

    let mut changed = 0;
    for entry in pipe.spin_loop_mut(&selection) {
        if entry.spin.isotope.is_some() && !force {
            warn!("The nuclear isotope type for the spin '{}' is already set.", entry.id);
            continue;
        }
        entry.spin.isotope = Some(isotope.to_string());
        changed += 1;
    }
    info!(isotope, spins = changed, "Set the spin isotope");
    Ok(changed)
}

/// Creates spins from the structural object of the current pipe.
pub fn load_spins(store: &mut DataStore, spin_id: Option<&str>) -> Result<usize> {
    let created = store.current_mut()?.load_spins(spin_id)?;
    info!(spins = created, "Loaded spins from the structure");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn jw_store() -> DataStore {
        let mut store = DataStore::new();
        store.add("test", "jw", None, true).unwrap();
        store
    }

    #[test]
    fn sequence_and_data_load_into_the_current_pipe() {
        let mut store = jw_store();
        let seq = file_with("Ubi 1 MET None N\nUbi 2 GLN None N\n");
        assert_eq!(read(&mut store, seq.path(), &ColumnSpec::sequence()).unwrap(), 2);

        let r1 = file_with("Ubi 1 MET None N 1.1 0.02\nUbi 2 GLN None N 1.3 0.03\n");
        let loaded =
            read_relax_data(&mut store, "R1_600", "R1", 600e6, r1.path(), &ColumnSpec::default()).unwrap();
        assert_eq!(loaded, 2);
        let pipe = store.current().unwrap();
        assert_eq!(pipe.ri_ids, vec!["R1_600"]);
        assert_eq!(pipe.frequencies(), vec![600e6]);
    }

    #[test]
    fn isotopes_are_only_overwritten_when_forced() {
        let mut store = jw_store();
        let seq = file_with("Ubi 1 MET None N\nUbi 2 GLN None N\n");
        read(&mut store, seq.path(), &ColumnSpec::sequence()).unwrap();

        assert_eq!(set_isotope(&mut store, Some(":1"), "15N", false).unwrap(), 1);
        assert_eq!(set_isotope(&mut store, None, "13C", false).unwrap(), 1);
        assert_eq!(set_isotope(&mut store, None, "15N", true).unwrap(), 2);
        let pipe = store.current().unwrap();
        let all = crate::core::models::selection::Selection::all();
        assert!(
            pipe.spin_loop(&all)
                .iter()
                .all(|view| view.spin.isotope.as_deref() == Some("15N"))
        );
    }

    #[test]
    fn unknown_isotopes_and_missing_sequences_are_errors() {
        let mut store = jw_store();
        assert!(matches!(
            set_isotope(&mut store, None, "99X", false),
            Err(RelaxError::General(_))
        ));
        assert!(matches!(
            set_isotope(&mut store, None, "15N", false),
            Err(RelaxError::NoSequence { .. })
        ));
    }

    #[test]
    fn operations_need_a_current_pipe() {
        let mut store = DataStore::new();
        let seq = file_with("Ubi 1 MET None N\n");
        assert!(matches!(
            read(&mut store, seq.path(), &ColumnSpec::sequence()),
            Err(RelaxError::NoCurrentPipe)
        ));
        assert!(matches!(load_spins(&mut store, None), Err(RelaxError::NoCurrentPipe)));
    }
}
