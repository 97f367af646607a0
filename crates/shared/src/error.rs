//! Error types shared across the workspace

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SharedError {
    #[error("Invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}
