// src/lib.rs

pub mod analysis;
pub mod annotate;
pub mod config;
pub mod detections;
pub mod error;
pub mod inference;
pub mod pipeline;
pub mod preprocessing;
pub mod types;

pub use error::{PhaseError, Result};
pub use pipeline::{Driver, RunSummary};
pub use types::Config;
