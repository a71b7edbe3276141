//! Error handling for TSR construction, evaluation and parsing

use std::io;
use thiserror::Error;

/// Unified error to report failures when building, evaluating, and reading TSRs and TSR chains.
#[derive(Debug, Error)]
pub enum TsrError {
    #[error("Bw range of rotational DOF {dof} is {range}, must be within 2*PI")]
    RotationRange { dof: usize, range: f64 },

    #[error("Bw bound of DOF {dof} is not finite")]
    NonFiniteBound { dof: usize },

    #[error("Bw bound of DOF {dof} is reversed: min {min} > max {max}")]
    ReversedBound { dof: usize, min: f64, max: f64 },

    #[error("Invalid Length: expected {expected}, found {found}")]
    InvalidLength { expected: usize, found: usize },

    #[error("Sample must be of equal length to TSR chain: expected {expected}, found {found}")]
    ChainLength { expected: usize, found: usize },

    #[error("xyzrpy must be within bounds: {check:?}")]
    OutOfBounds { check: [bool; 6] },

    #[error("Invalid xyzrpy: {check:?}")]
    InvalidPose { check: [bool; 6] },

    #[error("Invalid xyzrpy for chain elements {failed:?}: {check:?}")]
    InvalidChainPose { failed: Vec<usize>, check: Vec<[bool; 6]> },

    #[error("Not a rigid transform: {0}")]
    NotRigid(String),

    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Emit Error: {0}")]
    EmitError(String),

    #[error("IO Error: {0}")]
    IoError(#[from] io::Error),
}
