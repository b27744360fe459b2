// src/error.rs

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("detection file not found: {}", .0.display())]
    MissingDetectionFile(PathBuf),

    #[error("malformed detection line {line} in {}: {reason}", .path.display())]
    MalformedDetectionLine {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to load image {}: {reason}", .path.display())]
    ImageLoad { path: PathBuf, reason: String },

    #[error("failed to write image {}: {reason}", .path.display())]
    ImageWrite { path: PathBuf, reason: String },

    #[error("action classifier failed on {stem}: {reason}")]
    Classifier { stem: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T> = std::result::Result<T, PhaseError>;
