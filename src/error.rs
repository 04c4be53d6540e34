//! Error types for configuration, initialization and per-step calls.
//!
//! Every variant describes a programming or configuration mistake. Nothing here is
//! transient, so callers are expected to propagate with `?` and abort.

use crate::init::ParamRole;

pub type Result<T> = std::result::Result<T, RwkvError>;

#[derive(Debug, thiserror::Error)]
pub enum RwkvError {
    #[error("{name} = {value} must be a multiple of 32")]
    NotMultipleOf32 { name: &'static str, value: usize },

    #[error("attention width {dim_att} is not divisible by head size {head_size}")]
    HeadSizeMismatch { dim_att: usize, head_size: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no initialization rule matches parameter `{0}`")]
    UnclassifiedParameter(String),

    #[error("parameter `{name}` with shape {dims:?} cannot take role {role:?}")]
    RoleShapeMismatch {
        name: String,
        dims: Vec<usize>,
        role: ParamRole,
    },

    #[error("initializer covered {visited} of {expected} parameter elements; some parameter has no role")]
    UntaggedParameters { visited: usize, expected: usize },

    #[error("{what} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl RwkvError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    pub fn shape_mismatch(
        what: &'static str,
        expected: impl Into<Vec<usize>>,
        actual: impl Into<Vec<usize>>,
    ) -> Self {
        Self::ShapeMismatch {
            what,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
