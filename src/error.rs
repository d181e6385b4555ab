use thiserror::Error;

/// Structural failures that stop a validation run.
///
/// Row-level problems and quality findings are never reported through this
/// type; they travel as flags and issues instead.
#[derive(Error, Debug)]
pub enum RaterError {
    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Input table has no data rows")]
    EmptyTable,

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No input files found")]
    NoInputs,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RaterError>;
