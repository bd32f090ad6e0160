//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `MemoryRegistryClient`, `MemoryOutputSink`, `FixedClock` and
//! `RecordingDelay` that satisfy the trait contracts without touching the
//! network, the filesystem or the wall clock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::collaborators::*;
use crate::error::RemoteError;

// ---------------------------------------------------------------------------
// MemoryRegistryClient
// ---------------------------------------------------------------------------

/// A call observed by [`MemoryRegistryClient`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    FetchMetadata {
        name: String,
    },
    Publish {
        name: String,
        version: String,
    },
    AddDistTag {
        name: String,
        version: String,
        tag: String,
    },
    Install {
        name: String,
        version: String,
    },
}

/// In-memory package registry.
///
/// Packages are keyed by `(registry, name)` so a primary and a mirror channel
/// can share a package name. `publish` behaves like `npm publish --tag next`:
/// it adds the version, moves `next`, and leaves `latest` alone.
#[derive(Debug)]
pub struct MemoryRegistryClient {
    packages: Mutex<HashMap<String, RemoteInfo>>,
    artifacts: Mutex<HashMap<String, Value>>,
    calls: Mutex<Vec<RegistryCall>>,
    failing_publish: Mutex<HashSet<String>>,
    failing_tag: Mutex<HashSet<String>>,
    installed_overrides: Mutex<HashMap<String, Value>>,
    publish_time: Mutex<DateTime<Utc>>,
}

impl Default for MemoryRegistryClient {
    fn default() -> Self {
        Self {
            packages: Mutex::default(),
            artifacts: Mutex::default(),
            calls: Mutex::default(),
            failing_publish: Mutex::default(),
            failing_tag: Mutex::default(),
            installed_overrides: Mutex::default(),
            publish_time: Mutex::new(Utc::now()),
        }
    }
}

fn package_key(name: &str, registry: Option<&str>) -> String {
    format!("{}|{}", registry.unwrap_or(""), name)
}

fn artifact_key(name: &str, version: &str, registry: Option<&str>) -> String {
    format!("{}|{}@{}", registry.unwrap_or(""), name, version)
}

impl MemoryRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the metadata for `name` on the default registry.
    pub fn insert_package(&self, name: &str, info: RemoteInfo) {
        self.insert_package_at(None, name, info);
    }

    /// Seed the metadata for `name` on a specific registry.
    pub fn insert_package_at(&self, registry: Option<&str>, name: &str, info: RemoteInfo) {
        let mut packages = self.packages.lock().unwrap();
        packages.insert(package_key(name, registry), info);
    }

    /// Seed the installed `index.json` for `name@version`.
    pub fn insert_artifact(
        &self,
        registry: Option<&str>,
        name: &str,
        version: &str,
        index: Value,
    ) {
        let mut artifacts = self.artifacts.lock().unwrap();
        artifacts.insert(artifact_key(name, version, registry), index);
    }

    /// Make every subsequent `publish` of `name` fail.
    pub fn fail_publish_for(&self, name: &str) {
        self.failing_publish.lock().unwrap().insert(name.to_string());
    }

    /// Make every subsequent `add_dist_tag` on `name` fail.
    pub fn fail_dist_tag_for(&self, name: &str) {
        self.failing_tag.lock().unwrap().insert(name.to_string());
    }

    /// Make `install` of `name@version` return `index` no matter what was
    /// published, as a registry serving a corrupted tarball would.
    pub fn override_installed(
        &self,
        registry: Option<&str>,
        name: &str,
        version: &str,
        index: Value,
    ) {
        let mut overrides = self.installed_overrides.lock().unwrap();
        overrides.insert(artifact_key(name, version, registry), index);
    }

    /// Timestamp recorded as `last_modified` by subsequent publishes.
    pub fn set_publish_time(&self, at: DateTime<Utc>) {
        *self.publish_time.lock().unwrap() = at;
    }

    /// Current metadata for `name`, if seeded or published.
    pub fn package(&self, registry: Option<&str>, name: &str) -> Option<RemoteInfo> {
        let packages = self.packages.lock().unwrap();
        packages.get(&package_key(name, registry)).cloned()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: RegistryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn manifest_field<'a>(manifest: &'a Value, field: &str) -> RemoteResult<&'a str> {
    manifest
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| RemoteError::InvalidPackument(format!("manifest has no {}", field)))
}

#[async_trait]
impl RegistryClient for MemoryRegistryClient {
    async fn fetch_metadata(&self, name: &str, registry: Option<&str>) -> RemoteResult<RemoteInfo> {
        self.record(RegistryCall::FetchMetadata {
            name: name.to_string(),
        });
        self.package(registry, name)
            .ok_or_else(|| RemoteError::NotFound {
                name: name.to_string(),
            })
    }

    async fn publish(
        &self,
        manifest: &Value,
        files: &[ArtifactFile],
        registry: Option<&str>,
    ) -> RemoteResult<()> {
        let name = manifest_field(manifest, "name")?;
        let version = manifest_field(manifest, "version")?;
        self.record(RegistryCall::Publish {
            name: name.to_string(),
            version: version.to_string(),
        });

        if self.failing_publish.lock().unwrap().contains(name) {
            return Err(RemoteError::Injected(format!("publish of {} refused", name)));
        }

        let index = files
            .iter()
            .find(|f| f.path == "index.json")
            .map(|f| serde_json::from_slice::<Value>(&f.contents))
            .transpose()?
            .unwrap_or(Value::Null);

        let content_hash = manifest
            .get("contentHash")
            .and_then(Value::as_str)
            .map(str::to_string);
        let published_at = *self.publish_time.lock().unwrap();

        let mut packages = self.packages.lock().unwrap();
        let info = packages
            .entry(package_key(name, registry))
            .or_insert_with(|| RemoteInfo {
                dist_tags: BTreeMap::new(),
                versions: BTreeMap::new(),
                last_modified: published_at,
            });
        if info.versions.contains_key(version) {
            return Err(RemoteError::Command {
                program: "publish".to_string(),
                detail: format!("cannot publish over previously published version {}", version),
            });
        }
        info.versions
            .insert(version.to_string(), VersionMetadata { content_hash });
        info.dist_tags.insert("next".to_string(), version.to_string());
        info.last_modified = published_at;
        drop(packages);

        let mut artifacts = self.artifacts.lock().unwrap();
        artifacts.insert(artifact_key(name, version, registry), index);
        Ok(())
    }

    async fn add_dist_tag(
        &self,
        name: &str,
        version: &str,
        tag: &str,
        registry: Option<&str>,
    ) -> RemoteResult<()> {
        self.record(RegistryCall::AddDistTag {
            name: name.to_string(),
            version: version.to_string(),
            tag: tag.to_string(),
        });
        if self.failing_tag.lock().unwrap().contains(name) {
            return Err(RemoteError::Injected(format!("dist-tag on {} refused", name)));
        }
        let mut packages = self.packages.lock().unwrap();
        let info = packages
            .get_mut(&package_key(name, registry))
            .ok_or_else(|| RemoteError::NotFound {
                name: name.to_string(),
            })?;
        if !info.versions.contains_key(version) {
            return Err(RemoteError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        info.dist_tags.insert(tag.to_string(), version.to_string());
        Ok(())
    }

    async fn install(
        &self,
        name: &str,
        version: &str,
        registry: Option<&str>,
    ) -> RemoteResult<Value> {
        self.record(RegistryCall::Install {
            name: name.to_string(),
            version: version.to_string(),
        });
        let key = artifact_key(name, version, registry);
        if let Some(index) = self.installed_overrides.lock().unwrap().get(&key) {
            return Ok(index.clone());
        }
        let artifacts = self.artifacts.lock().unwrap();
        artifacts
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::VersionNotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MemoryOutputSink
// ---------------------------------------------------------------------------

/// In-memory output sink backed by a `BTreeMap<path, bytes>`.
#[derive(Debug, Default)]
pub struct MemoryOutputSink {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryOutputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl OutputSink for MemoryOutputSink {
    async fn write(&self, path: &str, contents: &[u8]) -> RemoteResult<()> {
        let mut files = self.files.lock().unwrap();
        files.insert(path.to_string(), contents.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FixedClock / RecordingDelay
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Delay that returns immediately and remembers what it was asked to wait.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    requests: Mutex<Vec<Duration>>,
}

impl RecordingDelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<Duration> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Delay for RecordingDelay {
    async fn sleep(&self, duration: Duration) {
        self.requests.lock().unwrap().push(duration);
    }
}
