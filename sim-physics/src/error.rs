//! Errors raised while building controllers, shapes and fire control.
//!
//! Everything here is a configuration problem detected at construction time.
//! Normal negative outcomes of the simulation (a weapon still recharging, a
//! ray that misses) are plain `Option`/`bool` results and never show up here.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("unable to solve CARE for LQR controller: {0}")]
    Riccati(String),

    #[error("eigen-decomposition failed: {0}")]
    Eigen(String),

    #[error("matrix is singular")]
    Singular,

    #[error("dimension mismatch: {0}")]
    Dimension(String),

    #[error("degenerate geometry in shape '{name}': {reason}")]
    DegenerateGeometry { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SimError>;
