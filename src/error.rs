// error.rs - Error taxonomy shared by the simulation core and the binaries

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdwError {
    #[error("Required parameter {0} is missing")]
    ParameterMissing(String),

    #[error("Parameter {name} has an invalid value: {value}")]
    ParameterWrong { name: String, value: String },

    #[error("Internal consistency violated: {0}")]
    Inconsistent(String),

    #[error("Unsupported code path: {0}")]
    UnsupportedCodePath(&'static str),

    #[error("Matrix is singular: {0}")]
    SingularMatrix(&'static str),

    #[error("Could not parse {what}: {value}")]
    Parse { what: String, value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SdwError {
    pub fn wrong(name: &str, value: impl ToString) -> Self {
        SdwError::ParameterWrong { name: name.to_string(), value: value.to_string() }
    }

    pub fn missing(name: &str) -> Self {
        SdwError::ParameterMissing(name.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SdwError>;
