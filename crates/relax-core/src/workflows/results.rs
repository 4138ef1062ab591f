use crate::core::error::{RelaxError, Result};
use crate::core::io::results::{ResultsLine, read_results, write_results};
use crate::core::store::DataStore;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{info, instrument};

/// Writes the spectral density mapping results of the current pipe.
#[instrument(skip_all, name = "results_write")]
pub fn write(store: &DataStore, path: impl AsRef<Path>, force: bool) -> Result<()> {
    let path = path.as_ref();
    if path.exists() && !force {
        return Err(RelaxError::General(format!(
            "The file '{}' already exists.  Set the force flag to overwrite.",
            path.display()
        )));
    }
    let pipe_name = store.current_name().unwrap_or_default().to_string();
    let pipe = store.current()?;
    let file = File::create(path).map_err(|e| RelaxError::file(path, e))?;
    let mut writer = BufWriter::new(file);
    write_results(&mut writer, &pipe_name, pipe)?;
    writer.flush()?;
    info!(path = %path.display(), "Wrote the results file");
    Ok(())
}

pub fn read(path: impl AsRef<Path>) -> Result<Vec<ResultsLine>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RelaxError::file(path, e))?;
    Ok(read_results(BufReader::new(file))?)
}
