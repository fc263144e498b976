use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Unreadable input {}: {reason}", path.display())]
    BadInput { path: PathBuf, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unrecognized method: {0}")]
    InvalidMethod(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Not enough input frames: need {needed}, found {found}")]
    InsufficientInput { needed: usize, found: usize },

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Inputs disagree: {0}")]
    Mismatch(String),

    #[error("Table schemas differ: {0}")]
    SchemaMismatch(String),

    #[error("Task {0} is already registered")]
    DuplicateName(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Column {column} in table {table} has {found} rows, expected {expected}")]
    ColumnLengthMismatch {
        table: String,
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EoError {
    /// Errors that only invalidate a single work cell.
    ///
    /// The iteration driver logs these and moves on to the next cell; every
    /// other variant aborts the run. Shape disagreements always come from the
    /// frames of one cell.
    pub fn is_cell_local(&self) -> bool {
        matches!(
            self,
            Self::MissingInput(_)
                | Self::Mismatch(_)
                | Self::InsufficientInput { .. }
                | Self::ShapeMismatch { .. }
                | Self::BadInput { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, EoError>;
