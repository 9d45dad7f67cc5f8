//! Engine error type.

use std::fmt;

use crate::netlink::Error as PlatformError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Category of an [`Error`], stable across the C boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The document or the desired state is invalid. Nothing was changed.
    SchemaError,
    /// The kernel refused or failed an operation.
    PlatformError,
    /// Apply finished but the re-read state differs from the desired state.
    VerificationError,
    /// Internal inconsistency.
    Bug,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SchemaError => "SchemaError",
            Self::PlatformError => "PlatformError",
            Self::VerificationError => "VerificationError",
            Self::Bug => "Bug",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by parsing, retrieval and apply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The document is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The document is JSON but violates the schema or a plan invariant.
    #[error("{0}")]
    Schema(String),

    /// Two entries of one document share a name.
    #[error("duplicate interface: {name}")]
    DuplicateInterface {
        /// The repeated name.
        name: String,
    },

    /// An interface `type` outside the known set.
    #[error("{iface}: unknown interface type '{value}'")]
    UnknownType {
        /// Interface carrying the bad type.
        iface: String,
        /// The offending value.
        value: String,
    },

    /// A kernel provider call failed outside of plan execution.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// A plan step failed. Steps before `index` were applied and are not undone.
    #[error("step {index}/{total} ({operation}) failed: {source}")]
    Apply {
        /// One-based position of the failed step.
        index: usize,
        /// Number of steps in the plan.
        total: usize,
        /// Summary of the failed step.
        operation: String,
        /// The provider error.
        source: PlatformError,
    },

    /// Post-apply state does not match the desired state.
    #[error("{object}: {reason}")]
    Verification {
        /// Interface name or route description.
        object: String,
        /// What differs.
        reason: String,
    },

    /// Internal inconsistency.
    #[error("internal error: {0}")]
    Bug(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Json(_)
            | Self::Schema(_)
            | Self::DuplicateInterface { .. }
            | Self::UnknownType { .. } => ErrorKind::SchemaError,
            Self::Platform(_) | Self::Apply { .. } => ErrorKind::PlatformError,
            Self::Verification { .. } => ErrorKind::VerificationError,
            Self::Bug(_) => ErrorKind::Bug,
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// The underlying kernel error, if any.
    pub fn platform_error(&self) -> Option<&PlatformError> {
        match self {
            Self::Platform(e) | Self::Apply { source: e, .. } => Some(e),
            _ => None,
        }
    }
}
