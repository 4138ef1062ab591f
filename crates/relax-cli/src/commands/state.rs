use crate::cli::StateArgs;
use crate::error::Result;
use nmr_relax::core::store::DataStore;
use nmr_relax::workflows::pipes::{self, PipeTable};
use nmr_relax::workflows::{align_tensor, state};
use std::fmt::Write;
use tracing::info;

pub async fn run(args: StateArgs) -> Result<()> {
    info!("Reading the relax state {:?}", &args.file);
    let mut store = DataStore::new();
    state::load(&mut store, &args.file, None)?;
    print!("{}", render(&mut store)?);
    Ok(())
}

fn format_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "None".to_string(), |v| format!("{v:.6e}"))
}

/// The pipe table followed by the contents of every pipe.
fn render(store: &mut DataStore) -> Result<String> {
    let mut out = String::new();
    let current = store.current_name().map(str::to_string);
    let _ = write!(out, "{}", PipeTable(&pipes::display(store)));

    for pipe in state::overview(store) {
        let _ = writeln!(out, "\nData pipe '{}' ({}):", pipe.name, pipe.pipe_type);
        let _ = writeln!(out, "  Spins: {} ({} selected)", pipe.spins, pipe.selected_spins);
        if !pipe.ri_ids.is_empty() {
            let _ = writeln!(out, "  Relaxation data: {}", pipe.ri_ids.join(", "));
        }
        if let Some(frq) = pipe.jw_frq {
            let _ = writeln!(out, "  J(w) mapping frequency: {} MHz", frq / 1e6);
        }
        if let Some(sims) = pipe.sim_number {
            let _ = writeln!(out, "  Monte Carlo simulations: {sims}");
        }
        if pipe.models > 0 {
            let _ = writeln!(out, "  Structural models: {}", pipe.models);
        }
        if pipe.tensors.is_empty() {
            continue;
        }
        store.switch(&pipe.name)?;
        for tensor in align_tensor::display(store)? {
            let _ = writeln!(
                out,
                "  Alignment tensor '{}': Aa = {}, Ar = {}, eta = {}",
                tensor.name,
                format_opt(tensor.aa),
                format_opt(tensor.ar),
                format_opt(tensor.eta)
            );
        }
    }

    if let Some(name) = current {
        store.switch(&name)?;
    }
    Ok(out)
}
