//! Event tables for knowledge-tracing feature preparation.
//!
//! A [`Table`] wraps a polars `DataFrame` and adds the checks the feature
//! stages rely on: unique column names, equal column lengths, and typed
//! accessors that report the offending column when a kind does not match.
//! Every cell is optional: a null cell is the missing marker that downstream
//! stages (feature derivation, categorical encoding) rely on.
//!
//! # Modules
//!
//! - [`table`]: the [`Table`] type and its pure, table-returning operations
//! - [`schema`]: column names and constants of the raw event schema
//! - [`io`]: CSV reading and writing through the polars CSV reader and writer

use std::path::PathBuf;

use polars::prelude::{DataType, PolarsError};

pub use self::table::{Table, timestamp_series};

pub mod io;
pub mod schema;
pub mod table;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum FrameError {
    #[display("column '{name}' not found")]
    MissingColumn { name: String },
    #[display("column '{name}' already exists")]
    DuplicateColumn { name: String },
    #[display("column '{name}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[display("column '{name}' has type {actual}, expected {expected}")]
    KindMismatch {
        name: String,
        expected: DataType,
        actual: DataType,
    },
    #[display("tables have different columns: [{}] vs [{}]", left.join(", "), right.join(", "))]
    SchemaMismatch {
        left: Vec<String>,
        right: Vec<String>,
    },
    #[display("invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },
    #[display("row index {row} is out of range")]
    RowIndex { row: usize },
    #[display("failed to access {}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("malformed CSV in {}", path.display())]
    Csv { path: PathBuf, source: PolarsError },
    #[display("{source}")]
    Polars { source: PolarsError },
}

impl From<PolarsError> for FrameError {
    fn from(source: PolarsError) -> Self {
        Self::Polars { source }
    }
}
