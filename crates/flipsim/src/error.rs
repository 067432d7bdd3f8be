//! Error types for the solver and its scene collaborator.
//!
//! Numerical edge cases never show up here: they are clamped in place.
//! Only setup failures and collaborator failures are reported.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlipError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to allocate grid storage for {cells} cells")]
    Allocation { cells: usize },
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Failed to read config file: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
    #[error("Grid shape {found:?} does not match solver shape {expected:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },
    #[error("Simulation stepped before initialize()")]
    NotInitialized,
}

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("Failed to export frame {frame}: {reason}")]
    Export { frame: u32, reason: String },
    #[error("Scene I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
