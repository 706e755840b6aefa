// Error types shared by the loader, the pipeline and the writers.

use thiserror::Error;

/// Invalid report settings. Raised before any pipeline stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("analysis window must be at least one month, got {0}")]
    InvalidWindow(i64),

    #[error("analysis window of {0} months is too large")]
    WindowTooLarge(i64),

    #[error("reservation range is empty: minimum {min} is greater than maximum {max}")]
    InvalidBounds { min: i64, max: i64 },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("required column '{0}' not found in the export header")]
    MissingColumn(&'static str),

    #[error("unsupported input file: {0}")]
    UnsupportedFormat(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, ReportError>;
