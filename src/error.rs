//! Mimir error types

use std::fmt::{Debug, Display};
use std::path::PathBuf;

/// Mimir error types
///
/// `Clone` so a single generation outcome can be handed to every caller
/// waiting on it; I/O and serde failures are captured as messages.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MimirError {
    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unknown cache key: {0}")]
    UnknownKey(String),

    #[error("invalid cache key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    // Generation errors
    #[error("generation failed for '{key}': {message}")]
    Generation { key: String, message: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("filesystem error at {}: {message}", path.display())]
    Filesystem { path: PathBuf, message: String },

    #[error("worker error: {0}")]
    Worker(String),

    // Sweep errors (logged, never returned from read/write)
    #[error("failed to remove obsolete cache file {}: {message}", path.display())]
    Sweep { path: PathBuf, message: String },
}

impl MimirError {
    /// Build a [`MimirError::Filesystem`] from any displayable I/O failure.
    pub fn filesystem(path: impl Into<PathBuf>, err: impl Display) -> Self {
        MimirError::Filesystem {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Build a [`MimirError::Generation`] for `key`.
    pub fn generation(key: impl Into<String>, message: impl Display) -> Self {
        MimirError::Generation {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Whether this error came out of producing or publishing an artifact.
    ///
    /// These are the failures that reject an in-flight generation; the next
    /// `read`/`write` or scheduled refresh retries them.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            MimirError::Generation { .. }
                | MimirError::Serialization(_)
                | MimirError::Filesystem { .. }
                | MimirError::Worker(_)
        )
    }
}

impl From<serde_json::Error> for MimirError {
    fn from(err: serde_json::Error) -> Self {
        MimirError::Serialization(err.to_string())
    }
}

impl<E: Debug> From<ciborium::ser::Error<E>> for MimirError {
    fn from(err: ciborium::ser::Error<E>) -> Self {
        MimirError::Serialization(format!("CBOR encode: {err}"))
    }
}

impl<E: Debug> From<ciborium::de::Error<E>> for MimirError {
    fn from(err: ciborium::de::Error<E>) -> Self {
        MimirError::Serialization(format!("CBOR decode: {err}"))
    }
}

/// Result type alias for Mimir operations
pub type Result<T> = std::result::Result<T, MimirError>;
