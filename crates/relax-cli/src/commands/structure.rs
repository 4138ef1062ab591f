use crate::cli::StructureArgs;
use crate::error::{CliError, Result};
use nmr_relax::core::store::DataStore;
use nmr_relax::core::structure::{CentreType, LoadOptions};
use nmr_relax::workflows::{pipes, structure};
use tracing::info;

/// What was done to the ensemble before it was written.
#[derive(Debug, Default)]
struct Outcome {
    superimposed: usize,
    rmsd: Option<f64>,
    averaged: bool,
}

pub async fn run(args: StructureArgs) -> Result<()> {
    info!("Loading input structure from {:?}", &args.input);
    let outcome = tokio::task::block_in_place(|| process(&args))?;

    if outcome.superimposed > 0 {
        println!("Superimposed {} model(s).", outcome.superimposed);
    }
    if let Some(rmsd) = outcome.rmsd {
        println!("Atomic RMSD of the ensemble: {rmsd:.3} Å");
    }
    if outcome.averaged {
        println!("Replaced the ensemble by its mean structure.");
    }
    println!("✓ Structure written to: {}", args.output.display());
    Ok(())
}

fn process(args: &StructureArgs) -> Result<Outcome> {
    let mut store = DataStore::new();
    pipes::create(&mut store, "structure", "N-state", None)?;

    let loaded = structure::load(&mut store, &args.input, args.format, &LoadOptions::default())?;
    if !loaded {
        return Err(CliError::FileParsing {
            path: args.input.clone(),
            source: anyhow::anyhow!("no {} structural data could be read", args.format),
        });
    }

    let mut outcome = Outcome::default();
    if let Some(method) = args.superimpose {
        let displacements = structure::superimpose(
            &mut store,
            None,
            args.atom_id.as_deref(),
            method.into(),
            CentreType::Centroid,
        )?;
        outcome.superimposed = displacements.len();
        outcome.rmsd = Some(structure::rmsd(&store, args.atom_id.as_deref())?);
    }
    if args.mean {
        structure::mean(&mut store)?;
        outcome.averaged = true;
    }

    structure::write_pdb(&store, &args.output, args.model, args.force)?;
    Ok(outcome)
}
