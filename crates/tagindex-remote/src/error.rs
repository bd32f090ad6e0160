//! Error types for tagindex-remote

use thiserror::Error;

/// Errors raised by the external collaborators (registry, output sink).
#[derive(Error, Debug)]
pub enum RemoteError {
    /// An external command (e.g. `npm`) exited unsuccessfully
    #[error("{program} failed: {detail}")]
    Command { program: String, detail: String },

    /// Registry HTTP request failed
    #[error("registry request failed: {0}")]
    Http(String),

    /// Package does not exist on the registry
    #[error("package not found on registry: {name}")]
    NotFound { name: String },

    /// A specific version of a package has not been published
    #[error("version {version} of {name} is not published")]
    VersionNotFound { name: String, version: String },

    /// Registry returned a document we could not interpret
    #[error("invalid packument: {0}")]
    InvalidPackument(String),

    /// Refused by a fake configured to fail
    #[error("injected failure: {0}")]
    Injected(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Http(err.to_string())
    }
}
