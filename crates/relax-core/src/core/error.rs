use crate::core::io::columns::ColumnFileError;
use crate::core::io::gaussian::GaussianError;
use crate::core::io::pdb::PdbError;
use crate::core::io::xml::XmlError;
use crate::core::io::xyz::XyzError;
use crate::engine::monte_carlo::MonteCarloError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelaxError {
    #[error("{0}")]
    General(String),

    #[error("The sequence data for the data pipe '{pipe}' does not exist.")]
    NoSequence { pipe: String },

    #[error("The type of nucleus has not yet been set.")]
    Nucleus,

    #[error("The {name} value has not yet been set.")]
    NoValue { name: String },

    #[error("The data pipe '{0}' already exists.")]
    Pipe(String),

    #[error("The data pipe '{0}' has not been created yet.")]
    NoPipe(String),

    #[error("The current data pipe has not been set.")]
    NoCurrentPipe,

    #[error("This function is only available to the data pipe type '{expected}', not '{found}'.")]
    PipeType {
        expected: &'static str,
        found: String,
    },

    #[error(
        "The data pipe type '{0}' is invalid and must be one of 'ct', 'frame order', 'jw', 'hybrid', 'mf', 'N-state', 'noe', 'relax_disp' or 'relax_fit'."
    )]
    InvalidPipeType(String),

    #[error("No structures have been loaded.")]
    NoPdb,

    #[error("No data is present for the alignment tensor '{tensor}'.")]
    NoTensor { tensor: String },

    #[error("The frequency has not been set.")]
    NoFrequency,

    #[error("The frequency for the data pipe '{pipe}' has already been set.")]
    FrequencyAlreadySet { pipe: String },

    #[error("No relaxation data corresponding to the frequency {frequency} has been loaded.")]
    NoRiData { frequency: f64 },

    #[error("The relaxation data ID '{0}' already exists.")]
    RiIdExists(String),

    #[error("The relaxation data type '{0}' is unknown, it must be one of 'R1', 'R2' or 'NOE'.")]
    UnknownRiType(String),

    #[error("Monte Carlo simulations have not been set up.")]
    NoSimulations,

    #[error("The simulation index {index} is out of range for {num} simulations.")]
    SimIndex { index: usize, num: usize },

    #[error("The object '{0}' is not modifiable.")]
    ReadOnly(String),

    #[error("The parameter '{0}' is unknown.")]
    UnknownParameter(String),

    #[error("The data type '{0}' does not exist.")]
    UnknownDataName(String),

    #[error("{0}")]
    InvalidData(String),

    #[error("{0}")]
    Structure(String),

    #[error("Cannot access the file '{path}': {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Pdb(#[from] PdbError),

    #[error(transparent)]
    Xyz(#[from] XyzError),

    #[error(transparent)]
    Gaussian(#[from] GaussianError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error(transparent)]
    Columns(#[from] ColumnFileError),

    #[error(transparent)]
    MonteCarlo(#[from] MonteCarloError),
}

pub type Result<T> = std::result::Result<T, RelaxError>;

impl RelaxError {
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
