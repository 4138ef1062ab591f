use clap::{Args, Parser, Subcommand, ValueEnum};
use nmr_relax::core::structure::SuperimposeMethod;
use nmr_relax::workflows::structure::StructureFormat;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Edward d'Auvergne",
    version,
    about = "relax - NMR relaxation analysis: reduced spectral density mapping, structural ensembles and relax state files.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for the Monte Carlo simulations.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a reduced spectral density mapping analysis described by a TOML file.
    Jw(JwArgs),
    /// Load, superimpose and rewrite a structural ensemble.
    Structure(StructureArgs),
    /// Summarise the pipes, spins and alignment tensors of a relax state file.
    State(StateArgs),
    /// Print the value lines of a spectral density mapping results file.
    Results(ResultsArgs),
}

/// Arguments for the `jw` subcommand.
#[derive(Args, Debug)]
pub struct JwArgs {
    /// Path to the analysis file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Path of the results file, overriding `output.results` from the analysis file.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Save the final program state to this XML file.
    #[arg(long, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// Override the proton frequency (Hz) of the data to map.
    #[arg(long, value_name = "HZ")]
    pub frequency: Option<f64>,

    /// Override the number of Monte Carlo simulations.
    #[arg(long, value_name = "INT")]
    pub sims: Option<usize>,

    /// Seed of the Monte Carlo random number generator.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Overwrite existing output files.
    #[arg(short, long)]
    pub force: bool,

    /// Set a specific configuration value, overriding the analysis file.
    /// Can be used multiple times. Example: -S simulations=500
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// The superposition algorithms available on the command line.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuperimposeArg {
    FitToFirst,
    FitToMean,
}

impl From<SuperimposeArg> for SuperimposeMethod {
    fn from(arg: SuperimposeArg) -> Self {
        match arg {
            SuperimposeArg::FitToFirst => SuperimposeMethod::FitToFirst,
            SuperimposeArg::FitToMean => SuperimposeMethod::FitToMean,
        }
    }
}

/// Arguments for the `structure` subcommand.
#[derive(Args, Debug)]
pub struct StructureArgs {
    /// Path to the input structure file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Path for the output PDB file.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Format of the input file: pdb, xyz or gaussian.
    #[arg(long, default_value_t = StructureFormat::Pdb, value_name = "FORMAT")]
    pub format: StructureFormat,

    /// Superimpose the models of the ensemble before writing.
    #[arg(long, value_enum, value_name = "METHOD")]
    pub superimpose: Option<SuperimposeArg>,

    /// Atom selection used for the superposition, e.g. '@N,CA,C'.
    #[arg(long, value_name = "ID")]
    pub atom_id: Option<String>,

    /// Replace the ensemble by its mean structure.
    #[arg(long)]
    pub mean: bool,

    /// Only write this model.
    #[arg(long, value_name = "NUM", conflicts_with = "mean")]
    pub model: Option<i64>,

    /// Overwrite an existing output file.
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the `state` subcommand.
#[derive(Args, Debug)]
pub struct StateArgs {
    /// The relax XML state file.
    #[arg(required = true, value_name = "FILE")]
    pub file: PathBuf,
}

/// Arguments for the `results` subcommand.
#[derive(Args, Debug)]
pub struct ResultsArgs {
    /// The results file written by `relax jw`.
    #[arg(required = true, value_name = "FILE")]
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jw_arguments_parse() {
        let cli = Cli::parse_from([
            "relax", "-vv", "jw", "-c", "analysis.toml", "--sims", "50", "-S", "seed=3",
        ]);
        assert_eq!(cli.verbose, 2);
        let Commands::Jw(args) = cli.command else {
            panic!("Expected 'jw' subcommand");
        };
        assert_eq!(args.sims, Some(50));
        assert_eq!(args.set_values, vec!["seed=3"]);
        assert!(args.output.is_none());
    }

    #[test]
    fn structure_arguments_parse() {
        let cli = Cli::parse_from([
            "relax",
            "structure",
            "-i",
            "in.xyz",
            "-o",
            "out.pdb",
            "--format",
            "xyz",
            "--superimpose",
            "fit-to-mean",
        ]);
        let Commands::Structure(args) = cli.command else {
            panic!("Expected 'structure' subcommand");
        };
        assert_eq!(args.format, StructureFormat::Xyz);
        assert_eq!(args.superimpose, Some(SuperimposeArg::FitToMean));
        assert!(!args.mean);
    }

    #[test]
    fn mean_and_model_are_exclusive() {
        let result = Cli::try_parse_from([
            "relax", "structure", "-i", "a.pdb", "-o", "b.pdb", "--mean", "--model", "2",
        ]);
        assert!(result.is_err());
    }
}
