use crate::cli::JwArgs;
use crate::error::{CliError, Result};
use nmr_relax::core::io::columns::ColumnSpec;
use nmr_relax::engine::config::{JwMappingConfig, JwMappingConfigBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const DEFAULT_PIPE: &str = "jw";

/// Column numbers from 1; 0 leaves the field unset.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialColumns {
    mol_name: Option<usize>,
    res_num: Option<usize>,
    res_name: Option<usize>,
    spin_num: Option<usize>,
    spin_name: Option<usize>,
    data: Option<usize>,
    error: Option<usize>,
}

impl PartialColumns {
    fn merge(self, defaults: ColumnSpec) -> ColumnSpec {
        let pick = |value: Option<usize>, default: Option<usize>| match value {
            Some(0) => None,
            Some(column) => Some(column),
            None => default,
        };
        ColumnSpec {
            mol_name: pick(self.mol_name, defaults.mol_name),
            res_num: pick(self.res_num, defaults.res_num),
            res_name: pick(self.res_name, defaults.res_name),
            spin_num: pick(self.spin_num, defaults.spin_num),
            spin_name: pick(self.spin_name, defaults.spin_name),
            data: pick(self.data, defaults.data),
            error: pick(self.error, defaults.error),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialSequence {
    file: PathBuf,
    columns: Option<PartialColumns>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct PartialRelaxData {
    id: String,
    #[serde(rename = "type")]
    ri_type: String,
    frequency: f64,
    file: PathBuf,
    columns: Option<PartialColumns>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialMappingConfig {
    frequency: Option<f64>,
    heteronucleus: Option<String>,
    proton: Option<String>,
    bond_length: Option<f64>,
    csa: Option<f64>,
    spin_id: Option<String>,
    overfit_deselect: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialMonteCarloConfig {
    simulations: Option<usize>,
    seed: Option<u64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
struct PartialOutputConfig {
    results: Option<PathBuf>,
    state: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct PartialAnalysisConfig {
    pipe: Option<String>,
    sequence: Option<PartialSequence>,
    #[serde(default)]
    relax_data: Vec<PartialRelaxData>,
    mapping: Option<PartialMappingConfig>,
    monte_carlo: Option<PartialMonteCarloConfig>,
    output: Option<PartialOutputConfig>,
    #[serde(skip)]
    base_dir: PathBuf,
}

/// A relaxation data file to load before the mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct RelaxDataSource {
    pub id: String,
    pub ri_type: String,
    pub frequency: f64,
    pub path: PathBuf,
    pub columns: ColumnSpec,
}

/// The merged settings of a `relax jw` run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub pipe_name: String,
    pub sequence: Option<(PathBuf, ColumnSpec)>,
    pub relax_data: Vec<RelaxDataSource>,
    pub results_path: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
    pub force: bool,
    pub core_config: JwMappingConfig,
}

fn invalid_value(key: &str, value: &str, kind: &str) -> CliError {
    CliError::Config(format!("Invalid {kind} value for {key}: {value}"))
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.parse().map_err(|_| invalid_value(key, value, kind))
}

impl PartialAnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading analysis configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn merge_with_cli(mut self, args: &JwArgs) -> Result<AnalysisConfig> {
        self.apply_set_values(&args.set_values)?;

        let mapping = self.mapping.take().unwrap_or_default();
        let monte_carlo = self.monte_carlo.take().unwrap_or_default();
        let output = self.output.take().unwrap_or_default();

        let frequency = args.frequency.or(mapping.frequency).ok_or_else(|| {
            CliError::Config(
                "`mapping.frequency` is required either in the config file or via --frequency."
                    .to_string(),
            )
        })?;
        let heteronucleus = mapping.heteronucleus.ok_or_else(|| {
            CliError::Config("`mapping.heteronucleus` is required.".to_string())
        })?;

        let mut builder = JwMappingConfigBuilder::new()
            .frequency(frequency)
            .heteronucleus(heteronucleus)
            .simulations(args.sims.or(monte_carlo.simulations).unwrap_or(0));
        if let Some(proton) = mapping.proton {
            builder = builder.proton(proton);
        }
        if let Some(r) = mapping.bond_length {
            builder = builder.bond_length(r);
        }
        if let Some(csa) = mapping.csa {
            builder = builder.csa(csa);
        }
        if let Some(spin_id) = mapping.spin_id {
            builder = builder.spin_id(spin_id);
        }
        if let Some(flag) = mapping.overfit_deselect {
            builder = builder.overfit_deselect(flag);
        }
        if let Some(seed) = args.seed.or(monte_carlo.seed) {
            builder = builder.seed(seed);
        }
        let core_config = builder.build()?;

        let sequence = self.sequence.take().map(|seq| {
            let columns = seq
                .columns
                .unwrap_or_default()
                .merge(ColumnSpec::sequence());
            (self.resolve(seq.file), columns)
        });
        let relax_data = std::mem::take(&mut self.relax_data)
            .into_iter()
            .map(|data| RelaxDataSource {
                columns: data
                    .columns
                    .unwrap_or_default()
                    .merge(ColumnSpec::default()),
                path: self.resolve(data.file),
                id: data.id,
                ri_type: data.ri_type,
                frequency: data.frequency,
            })
            .collect::<Vec<_>>();
        if relax_data.is_empty() {
            return Err(CliError::Config(
                "At least one `[[relax-data]]` entry is required.".to_string(),
            ));
        }

        let results_path = args
            .output
            .clone()
            .or_else(|| output.results.map(|p| self.resolve(p)));
        let state_path = args
            .state
            .clone()
            .or_else(|| output.state.map(|p| self.resolve(p)));

        Ok(AnalysisConfig {
            pipe_name: self.pipe.take().unwrap_or_else(|| DEFAULT_PIPE.to_string()),
            sequence,
            relax_data,
            results_path,
            state_path,
            force: args.force,
            core_config,
        })
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value_str)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };

            match key {
                "pipe" => self.pipe = Some(value_str.to_string()),
                "mapping.frequency" => {
                    self.mapping.get_or_insert_with(Default::default).frequency =
                        Some(parse_value(key, value_str, "float")?);
                }
                "mapping.heteronucleus" => {
                    self.mapping.get_or_insert_with(Default::default).heteronucleus =
                        Some(value_str.to_string());
                }
                "mapping.proton" => {
                    self.mapping.get_or_insert_with(Default::default).proton =
                        Some(value_str.to_string());
                }
                "mapping.bond-length" => {
                    self.mapping.get_or_insert_with(Default::default).bond_length =
                        Some(parse_value(key, value_str, "float")?);
                }
                "mapping.csa" => {
                    self.mapping.get_or_insert_with(Default::default).csa =
                        Some(parse_value(key, value_str, "float")?);
                }
                "mapping.spin-id" => {
                    self.mapping.get_or_insert_with(Default::default).spin_id =
                        Some(value_str.to_string());
                }
                "mapping.overfit-deselect" => {
                    self.mapping.get_or_insert_with(Default::default).overfit_deselect =
                        Some(parse_value(key, value_str, "boolean")?);
                }
                "monte-carlo.simulations" => {
                    self.monte_carlo.get_or_insert_with(Default::default).simulations =
                        Some(parse_value(key, value_str, "integer")?);
                }
                "monte-carlo.seed" => {
                    self.monte_carlo.get_or_insert_with(Default::default).seed =
                        Some(parse_value(key, value_str, "integer")?);
                }
                "output.results" => {
                    self.output.get_or_insert_with(Default::default).results =
                        Some(PathBuf::from(value_str));
                }
                "output.state" => {
                    self.output.get_or_insert_with(Default::default).state =
                        Some(PathBuf::from(value_str));
                }
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }
}
