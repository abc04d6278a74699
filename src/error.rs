//! Error types for the JSON index engine

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Range of {len} bytes exceeds the read window of {capacity} bytes")]
    RangeTooLarge { len: u64, capacity: usize },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Index build aborted: {0}")]
    BuildAborted(String),

    #[error("Index is not open")]
    Closed,
}

impl IndexError {
    /// Stable error code, used as the CLI error message prefix.
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::Io(_) => "IO_ERROR",
            IndexError::NotFound(_) => "NOT_FOUND",
            IndexError::RangeTooLarge { .. } => "RANGE_TOO_LARGE",
            IndexError::Decode(_) => "DECODE_ERROR",
            IndexError::Config(_) => "INVALID_CONFIG",
            IndexError::BuildAborted(_) => "BUILD_ABORTED",
            IndexError::Closed => "CLOSED",
            _ => "INTERNAL_ERROR",
        }
    }
}
