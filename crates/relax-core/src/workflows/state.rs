use crate::core::error::{RelaxError, Result};
use crate::core::models::pipe::PipeType;
use crate::core::models::selection::Selection;
use crate::core::store::DataStore;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, instrument};

/// An overview of one pipe of a state.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeOverview {
    pub name: String,
    pub pipe_type: PipeType,
    pub current: bool,
    pub spins: usize,
    pub selected_spins: usize,
    pub ri_ids: Vec<String>,
    pub jw_frq: Option<f64>,
    pub sim_number: Option<usize>,
    pub tensors: Vec<String>,
    pub models: usize,
}

/// Saves the given pipes, or the whole data store, as a relax XML state.
#[instrument(skip_all, name = "state_save")]
pub fn save(store: &DataStore, path: impl AsRef<Path>, pipes: Option<&[&str]>, force: bool) -> Result<()> {
    let path = path.as_ref();
    if path.exists() && !force {
        return Err(RelaxError::General(format!(
            "The file '{}' already exists.  Set the force flag to overwrite.",
            path.display()
        )));
    }
    let file = File::create(path).map_err(|e| RelaxError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    store.to_xml(&mut writer, pipes)?;
    writer.flush()?;
    info!(path = %path.display(), "Saved the program state");
    Ok(())
}

/// Restores a relax XML state into the store. Returns the names of the
/// pipes filled.
#[instrument(skip_all, name = "state_load")]
pub fn load(store: &mut DataStore, path: impl AsRef<Path>, pipe_to: Option<&str>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RelaxError::file(path, e))?;
    store.from_xml(BufReader::new(file), pipe_to)
}

pub fn overview(store: &DataStore) -> Vec<PipeOverview> {
    let all = Selection::all();
    store
        .pipe_names()
        .into_iter()
        .filter_map(|name| {
            let pipe = store.get(name).ok()?;
            let (spins, selected_spins) = if pipe.exists_mol_res_spin_data() {
                (pipe.count_spins(&all), pipe.count_selected_spins(&all))
            } else {
                (0, 0)
            };
            Some(PipeOverview {
                name: name.to_string(),
                pipe_type: pipe.pipe_type,
                current: store.current_name() == Some(name),
                spins,
                selected_spins,
                ri_ids: pipe.ri_ids.clone(),
                jw_frq: pipe.jw_frq,
                sim_number: pipe.sim_number,
                tensors: pipe
                    .align_tensors
                    .as_ref()
                    .map(|list| list.names().into_iter().map(str::to_string).collect())
                    .unwrap_or_default(),
                models: pipe.structure.as_ref().map_or(0, |s| s.num_models()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::{align_tensor, pipes};
    use tempfile::tempdir;

    fn populated_store() -> DataStore {
        let mut store = DataStore::new();
        pipes::create(&mut store, "mapping", "jw", Some("analysis")).unwrap();
        let pipe = store.current_mut().unwrap();
        pipe.create_spin(None, Some(1), Some("MET"), None, Some("N")).unwrap();
        pipe.create_spin(None, Some(2), Some("GLN"), None, Some("N")).unwrap();
        pipes::create(&mut store, "rdc", "N-state", None).unwrap();
        align_tensor::init(&mut store, "Pf1", None, [-1e-4, -2e-4, 0.0, 0.0, 0.0], None).unwrap();
        store
    }

    #[test]
    fn saved_states_restore_every_pipe() {
        let store = populated_store();
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.xml");
        save(&store, &path, None, false).unwrap();

        let mut restored = DataStore::new();
        let loaded = load(&mut restored, &path, None).unwrap();
        assert_eq!(loaded, vec!["mapping", "rdc"]);

        let rows = overview(&restored);
        assert_eq!(rows[0].spins, 2);
        assert_eq!(rows[1].tensors, vec!["Pf1"]);
        assert_eq!(restored.pipe_bundle("mapping"), Some("analysis"));
    }

    #[test]
    fn existing_files_need_force() {
        let store = populated_store();
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.xml");
        save(&store, &path, Some(&["rdc"]), false).unwrap();
        assert!(matches!(
            save(&store, &path, None, false),
            Err(RelaxError::General(_))
        ));
        save(&store, &path, None, true).unwrap();
    }

    #[test]
    fn single_pipe_states_load_into_an_empty_pipe() {
        let store = populated_store();
        let dir = tempdir().unwrap();
        let path = dir.path().join("rdc.xml");
        save(&store, &path, Some(&["rdc"]), false).unwrap();

        let mut target = DataStore::new();
        pipes::create(&mut target, "copy", "N-state", None).unwrap();
        assert_eq!(load(&mut target, &path, Some("copy")).unwrap(), vec!["copy"]);
        assert_eq!(overview(&target)[0].tensors, vec!["Pf1"]);
    }

    #[test]
    fn missing_files_report_their_path() {
        let mut store = DataStore::new();
        let err = load(&mut store, "/nonexistent/state.xml", None).unwrap_err();
        assert!(matches!(err, RelaxError::File { .. }));
    }
}
