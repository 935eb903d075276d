//! Shared error types for the cluster orchestration workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Matrix shape mismatch: expected {expected} values, found {found}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("Duplicate {axis} label: {label}")]
    DuplicateLabel { axis: String, label: String },

    #[error("Matrix parse error on line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Invalid UUID: {input}")]
    InvalidUuid { input: String },

    #[error("Invalid cluster id: {value}")]
    InvalidClusterId { value: u32 },
}

pub type SharedResult<T> = Result<T, SharedError>;
