use serde::{Serialize, Deserialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input path: {0}")]
    InvalidInputPath(String),
    #[error("invalid input file: {0}")]
    InvalidInputFile(String),
    #[error("failed to read input")]
    InputReadFailure,
    #[error("invalid JSON: {0:?}")]
    InvalidJson(JsonError),
    #[error("output path already exists: {0}")]
    OutputExists(String),

    #[error("invalid {parameter} for {distribution}: {value}")]
    InvalidParameter {
        distribution: &'static str,
        parameter: &'static str,
        value: f64,
    },
    #[error("shape mismatch in {context}: {left:?} vs {right:?}")]
    ShapeMismatch {
        context: String,
        left: Vec<usize>,
        right: Vec<usize>,
    },
    #[error("unknown compartment model {0:?} (expected \"SIR\" or \"SEIR\")")]
    UnknownCompartmentModel(String),
    #[error("compartment model {model} has no {field} compartment")]
    MissingCompartment {
        model: &'static str,
        field: String,
    },
    #[error("sample site {0:?} registered twice in one trace")]
    DuplicateSite(String),
    #[error("sample site {0:?} not found in trace")]
    MissingSite(String),
    #[error("no trace had a finite log likelihood")]
    DegenerateWeights,
    #[error("nothing to summarize")]
    NoSamples,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonError {
    pub description: String,
    pub category: String,
    pub line: usize,
    pub column: usize,
}

impl From<serde_json::error::Error> for Error {
    fn from(e: serde_json::error::Error) -> Self {
        Self::InvalidJson(JsonError {
            description: format!("{}", e),
            category: format!("{:?}", e.classify()),
            line: e.line(),
            column: e.column(),
        })
    }
}

impl Error {
    pub fn shape_mismatch(context: &str, left: &[usize], right: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}
