use std::path::PathBuf;
use thiserror::Error;

/// Everything the indicator engine and its loaders can fail with.
///
/// Unparseable cell values are never errors; they normalize to a sentinel
/// (`false`, `0`, `"Unknown"`, no date). Only configuration and I/O faults
/// end up here.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("column `{column}` not found in table")]
    MissingColumn { column: String },

    #[error("expected 1 to 4 structured programs, got {got}")]
    ProgramCount { got: usize },

    #[error("expected 1 to {max} session columns, got {got}")]
    SessionColumnCount { got: usize, max: usize },

    #[error("could not resolve a column for {role} (default name `{default}`)")]
    ColumnNotResolved { role: String, default: String },

    #[error("unsupported input file `{}`", path.display())]
    UnsupportedInput { path: PathBuf },

    #[error("sheet `{sheet}` not found in workbook")]
    SheetNotFound { sheet: String },

    #[error("invalid month `{0}`, expected YYYY-MM")]
    InvalidMonth(String),

    #[error(transparent)]
    Workbook(#[from] calamine::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    ConfigWrite(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;
