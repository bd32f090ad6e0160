use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tagindex_remote::ContentDigest;

use super::error::Result;

/// Tag name that every registry entry must carry.
pub const LATEST_TAG: &str = "latest";

/// One upstream package whose dist-tags are summarised in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageSummary {
    pub name: String,
    /// Name as it appears in URLs and cache file names (`@a/b` -> `@a%2Fb`).
    pub escaped_publish_name: String,
}

impl PackageSummary {
    pub fn new(name: impl Into<String>, escaped_publish_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            escaped_publish_name: escaped_publish_name.into(),
        }
    }
}

/// The published artifact: `{ "entries": { <package>: { <tag>: <version> } } }`.
///
/// Maps are `BTreeMap` so the serialised form, and therefore its digest, is
/// independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl Registry {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, package: &str) -> Option<&BTreeMap<String, String>> {
        self.entries.get(package)
    }

    /// Compact JSON with sorted keys; the input to [`Registry::content_digest`].
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Human-readable JSON written as `index.json`.
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn content_digest(&self) -> Result<ContentDigest> {
        Ok(ContentDigest::from_bytes(
            self.to_canonical_json()?.as_bytes(),
        ))
    }
}
