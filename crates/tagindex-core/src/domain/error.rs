//! Domain-level error taxonomy for tagindex.

use tagindex_remote::RemoteError;

/// tagindex domain errors.
#[derive(Debug, thiserror::Error)]
pub enum TagIndexError {
    #[error("malformed version: {input:?}")]
    MalformedVersion { input: String },

    #[error("no parseable version in version set")]
    EmptyVersionSet,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("no cached metadata for packages: {}", packages.join(", "))]
    MissingCachedInfo { packages: Vec<String> },

    #[error("regression detected at {path}: newer {newer} is behind older {older}")]
    RegressionDetected {
        path: String,
        newer: String,
        older: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The publish upload itself failed. Nothing was promoted, so the
    /// other channels and the exit status are unaffected.
    #[error("publish failed: {0}")]
    PublishFailed(#[source] RemoteError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TagIndexError {
    /// Whether this error must end the run with a non-zero status.
    ///
    /// Only a failed publish upload is tolerated. A failed fetch, install or
    /// tag call means validation or promotion did not happen as required.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TagIndexError::PublishFailed(_))
    }
}

/// Result type for tagindex domain operations.
pub type Result<T> = std::result::Result<T, TagIndexError>;
