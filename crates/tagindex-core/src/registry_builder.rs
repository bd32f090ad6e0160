//! Builds the [`Registry`] document from cached per-package metadata.
//!
//! Every input package must have a cache entry; a single miss fails the whole
//! build and the error lists every missing package. Tags that point at the same
//! version as `latest` are dropped to keep the document small.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tagindex_remote::RemoteInfo;
use tracing::{debug, warn};

use crate::domain::error::{Result, TagIndexError};
use crate::domain::registry::{PackageSummary, Registry, LATEST_TAG};

/// Source of already-fetched package metadata.
pub trait MetadataLookup {
    fn lookup(&self, package: &PackageSummary) -> Option<RemoteInfo>;
}

/// Lookup keyed by package name.
impl MetadataLookup for HashMap<String, RemoteInfo> {
    fn lookup(&self, package: &PackageSummary) -> Option<RemoteInfo> {
        self.get(&package.name).cloned()
    }
}

/// Reads `<dir>/<escapedPublishName>.json`, each holding a serialised [`RemoteInfo`].
///
/// Missing or unreadable files count as cache misses.
pub struct FsMetadataCache {
    dir: PathBuf,
}

impl FsMetadataCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn entry_path(&self, package: &PackageSummary) -> PathBuf {
        self.dir
            .join(format!("{}.json", package.escaped_publish_name))
    }
}

impl MetadataLookup for FsMetadataCache {
    fn lookup(&self, package: &PackageSummary) -> Option<RemoteInfo> {
        let path = self.entry_path(package);
        let bytes = std::fs::read(&path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable metadata cache entry");
                None
            }
        }
    }
}

/// Load the input package list (a JSON array of [`PackageSummary`]).
pub fn load_package_list(path: &Path) -> Result<Vec<PackageSummary>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Keep `latest` plus every tag whose version differs from it.
///
/// Without a `latest` tag there is nothing to compare against, so all tags are kept.
pub fn filter_dist_tags(dist_tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    match dist_tags.get(LATEST_TAG) {
        Some(latest) => dist_tags
            .iter()
            .filter(|(tag, version)| tag.as_str() == LATEST_TAG || *version != latest)
            .map(|(tag, version)| (tag.clone(), version.clone()))
            .collect(),
        None => dist_tags.clone(),
    }
}

/// Build the registry for `packages` from `lookup`.
pub fn build<L>(packages: &[PackageSummary], lookup: &L) -> Result<Registry>
where
    L: MetadataLookup + ?Sized,
{
    let mut registry = Registry::default();
    let mut missing = Vec::new();

    for package in packages {
        let Some(info) = lookup.lookup(package) else {
            missing.push(package.name.clone());
            continue;
        };

        if info.dist_tags.is_empty() {
            debug!(package = %package.name, "no dist-tags, skipping");
            continue;
        }
        if !info.dist_tags.contains_key(LATEST_TAG) {
            warn!(package = %package.name, "package has no latest tag");
        }
        registry
            .entries
            .insert(package.name.clone(), filter_dist_tags(&info.dist_tags));
    }

    if !missing.is_empty() {
        return Err(TagIndexError::MissingCachedInfo { packages: missing });
    }

    debug!(entries = registry.len(), "registry built");
    Ok(registry)
}
