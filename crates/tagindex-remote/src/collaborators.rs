//! Collaborator trait definitions for tagindex
//!
//! These traits define the seams between the publish logic and the outside world:
//! - `RegistryClient`: fetch metadata, publish, move dist-tags, install
//! - `OutputSink`: emit generated files
//! - `Clock` / `Delay`: wall-clock reads and the post-publish cool-down
//!
//! All async traits are backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::RemoteError;

/// Result type for collaborator operations
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Lowercase SHA-256 hex of a document, stamped as `contentHash` on every
/// published version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn from_bytes(data: &[u8]) -> Self {
        ContentDigest(hex::encode(Sha256::digest(data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// RemoteInfo
// ---------------------------------------------------------------------------

/// Per-version metadata we care about from a packument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    /// Digest of the registry document shipped in this version, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Snapshot of what is currently published under one package name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteInfo {
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,
    pub last_modified: DateTime<Utc>,
}

impl RemoteInfo {
    /// Convert an npm registry packument (`GET /<name>`) into a `RemoteInfo`.
    ///
    /// Reads `dist-tags`, `versions.*.contentHash` and `time.modified`.
    pub fn from_packument(doc: &Value) -> RemoteResult<Self> {
        let dist_tags = doc
            .get("dist-tags")
            .and_then(Value::as_object)
            .ok_or_else(|| RemoteError::InvalidPackument("missing dist-tags".to_string()))?
            .iter()
            .filter_map(|(tag, v)| v.as_str().map(|v| (tag.clone(), v.to_string())))
            .collect();

        let versions = doc
            .get("versions")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(version, meta)| {
                        let content_hash = meta
                            .get("contentHash")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        (version.clone(), VersionMetadata { content_hash })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let modified = doc
            .pointer("/time/modified")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::InvalidPackument("missing time.modified".to_string()))?;
        let last_modified = DateTime::parse_from_rfc3339(modified)
            .map_err(|e| RemoteError::InvalidPackument(format!("time.modified: {}", e)))?
            .with_timezone(&Utc);

        Ok(RemoteInfo {
            dist_tags,
            versions,
            last_modified,
        })
    }

    /// Version string the given dist-tag points at.
    pub fn tag(&self, tag: &str) -> Option<&str> {
        self.dist_tags.get(tag).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// RegistryClient
// ---------------------------------------------------------------------------

/// One file of a package tarball, path relative to the package root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFile {
    pub path: String,
    pub contents: Vec<u8>,
}

impl ArtifactFile {
    pub fn new(path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }
}

/// Package registry operations used by the publish workflow.
///
/// `registry` overrides the client's default registry URL when set (mirror
/// channels publish somewhere else).
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch the current published state of `name`.
    async fn fetch_metadata(&self, name: &str, registry: Option<&str>) -> RemoteResult<RemoteInfo>;

    /// Publish a package. `manifest` is the full `package.json` document.
    async fn publish(
        &self,
        manifest: &Value,
        files: &[ArtifactFile],
        registry: Option<&str>,
    ) -> RemoteResult<()>;

    /// Point `tag` at `name@version`.
    async fn add_dist_tag(
        &self,
        name: &str,
        version: &str,
        tag: &str,
        registry: Option<&str>,
    ) -> RemoteResult<()>;

    /// Install `name@version` and return its `index.json` document.
    async fn install(&self, name: &str, version: &str, registry: Option<&str>)
        -> RemoteResult<Value>;
}

// ---------------------------------------------------------------------------
// OutputSink
// ---------------------------------------------------------------------------

/// Destination for generated files.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Write `contents` to `path` (relative to the sink root), replacing any
    /// previous file.
    async fn write(&self, path: &str, contents: &[u8]) -> RemoteResult<()>;
}

// ---------------------------------------------------------------------------
// Clock / Delay
// ---------------------------------------------------------------------------

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Non-blocking wait used for the post-publish cool-down.
#[async_trait]
pub trait Delay: Send + Sync {
    async fn sleep(&self, duration: Duration);
}
