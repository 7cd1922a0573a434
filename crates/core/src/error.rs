//! Error types for HydroGrid

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for HydroGrid operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File does not exist: {}", .0.display())]
    FileDoesNotExist(PathBuf),

    #[error("Unsupported raster format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Multiple possible raster formats for {}", .0.display())]
    MultiplePossibleFormats(PathBuf),

    #[error("Malformed header in {}: line {line}, keyword '{keyword}'", .path.display())]
    MalformedHeader {
        path: PathBuf,
        line: usize,
        keyword: String,
    },

    #[error("Error reading {}: {reason}", .path.display())]
    ReadError { path: PathBuf, reason: String },

    #[error("Error writing {}: {reason}", .path.display())]
    WriteError { path: PathBuf, reason: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid raster dimensions: {rows} x {columns}")]
    InvalidDimensions { rows: usize, columns: usize },

    #[error("Grid size mismatch: expected {er} x {ec}, got {ar} x {ac}")]
    DimensionMismatch {
        er: usize,
        ec: usize,
        ar: usize,
        ac: usize,
    },

    #[error("Invalid argument: {name} = {value} ({reason})")]
    InvalidArgument {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Numeric domain error: {0}")]
    NumericDomain(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for HydroGrid operations
pub type Result<T> = std::result::Result<T, Error>;
