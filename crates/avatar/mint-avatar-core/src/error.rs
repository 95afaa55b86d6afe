//! Error types for the avatar controller and the native model boundary.

use std::path::PathBuf;

/// Errors reported by a native model runtime.
///
/// Optional capabilities default to [`NativeError::Unsupported`], which the
/// binding layer and controller treat as "skip quietly" rather than a failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum NativeError {
    /// The runtime does not implement this call shape at all.
    #[error("unsupported native call: {op}")]
    Unsupported { op: &'static str },

    /// The call shape exists but the model has no parameter with this id.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// The call failed for any other reason.
    #[error("native call failed: {0}")]
    Failed(String),
}

impl NativeError {
    pub fn unsupported(op: &'static str) -> Self {
        NativeError::Unsupported { op }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, NativeError::Unsupported { .. })
    }
}

/// Controller-level errors.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum AvatarError {
    /// The native runtime could not be initialised; every call becomes a no-op.
    #[error("native runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// No `*.model3.json` descriptor at or under the given path.
    #[error("model descriptor not found: {}", .0.display())]
    DescriptorNotFound(PathBuf),

    /// The native runtime refused to load the descriptor.
    #[error("failed to load model {}: {reason}", path.display())]
    ModelLoad { path: PathBuf, reason: String },

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid descriptor {}: {source}", path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Native(#[from] NativeError),
}

impl AvatarError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AvatarError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type AvatarResult<T> = Result<T, AvatarError>;
