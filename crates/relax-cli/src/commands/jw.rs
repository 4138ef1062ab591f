use crate::cli::JwArgs;
use crate::config::{AnalysisConfig, PartialAnalysisConfig};
use crate::error::Result;
use crate::utils::progress::CliProgressHandler;
use nmr_relax::core::io::results::write_results;
use nmr_relax::core::store::DataStore;
use nmr_relax::engine::progress::ProgressReporter;
use nmr_relax::workflows::jw_mapping::{self, JwMappingReport};
use nmr_relax::workflows::{pipes, results, sequence, state};
use tracing::info;

pub async fn run(args: JwArgs, quiet: bool) -> Result<()> {
    let partial_config = PartialAnalysisConfig::from_file(&args.config)?;
    info!("Merging configuration from file and CLI arguments...");
    let config = partial_config.merge_with_cli(&args)?;

    let progress_handler = CliProgressHandler::new(quiet);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting reduced spectral density mapping at {} MHz...",
        config.core_config.frequency / 1e6
    );
    let (store, report) = tokio::task::block_in_place(|| analyse(&config, &reporter))?;

    println!(
        "Mapped {} spin(s), {} deselected for insufficient data.",
        report.calculated, report.deselected
    );
    if report.simulations > 0 {
        println!("Errors from {} Monte Carlo simulations.", report.simulations);
    }

    match &config.results_path {
        Some(path) => println!("✓ Results written to: {}", path.display()),
        None => {
            let pipe = store.current()?;
            let mut stdout = std::io::stdout().lock();
            write_results(&mut stdout, &config.pipe_name, pipe)?;
        }
    }
    if let Some(path) = &config.state_path {
        println!("✓ State saved to: {}", path.display());
    }
    Ok(())
}

/// Loads the data of the analysis file into a fresh store, maps it and
/// writes the requested output files.
fn analyse(config: &AnalysisConfig, reporter: &ProgressReporter) -> Result<(DataStore, JwMappingReport)> {
    let mut store = DataStore::new();
    pipes::create(&mut store, &config.pipe_name, "jw", None)?;

    if let Some((path, columns)) = &config.sequence {
        info!("Reading the sequence from {:?}", path);
        sequence::read(&mut store, path, columns)?;
    }
    for data in &config.relax_data {
        info!("Reading the {} data '{}' from {:?}", data.ri_type, data.id, data.path);
        sequence::read_relax_data(
            &mut store,
            &data.id,
            &data.ri_type,
            data.frequency,
            &data.path,
            &data.columns,
        )?;
    }

    let report = jw_mapping::run(&mut store, &config.core_config, reporter)?;

    if let Some(path) = &config.results_path {
        results::write(&store, path, config.force)?;
    }
    if let Some(path) = &config.state_path {
        state::save(&store, path, None, config.force)?;
    }
    Ok((store, report))
}
