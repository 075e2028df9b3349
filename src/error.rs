//! Error taxonomy for the TDN core.
//!
//! Structural failures (bad spec, shape mismatch, incompatible checkpoint) are
//! always fatal and propagate as [`CoreError`]. Numeric instability and
//! persistence failures are deliberately *not* represented as a returned
//! `Err` at the call sites that detect them in training: per the agent's
//! failure semantics they are logged and training continues. They still get
//! variants here so a caller that does want to treat them as fatal (tests,
//! strict hosts) has a concrete type to match on.

use thiserror::Error;

/// Every fallible operation in this crate returns this error type.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown layer kind, missing size entry, a dangling input reference,
    /// or a duplicate layer name discovered while building a [`crate::network::TDNetwork`].
    #[error("invalid network spec: {0}")]
    SpecInvalid(String),

    /// Two tensors (or a tensor and a declared size) disagree on shape.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A loaded parameter blob doesn't match the shapes the spec declares.
    #[error("checkpoint incompatible: {0}")]
    CheckpointIncompatible(String),

    /// Save/load of the parameter blob failed at the I/O layer.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn shape_mismatch(expected: impl Into<Vec<usize>>, found: impl Into<Vec<usize>>) -> Self {
        CoreError::ShapeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
