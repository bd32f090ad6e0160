//! npm registry client
//!
//! Reads packuments over the registry HTTP API and performs the mutating
//! operations (publish, dist-tag, install) through the `npm` CLI so that the
//! user's `.npmrc` credentials apply.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info};

use crate::collaborators::{ArtifactFile, RegistryClient, RemoteInfo, RemoteResult};
use crate::error::RemoteError;

/// Default public registry.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// npm client configuration
#[derive(Debug, Clone)]
pub struct NpmConfig {
    /// Registry used when a call does not name one
    pub registry_url: String,
    /// npm executable
    pub npm_bin: String,
}

impl Default for NpmConfig {
    fn default() -> Self {
        NpmConfig {
            registry_url: std::env::var("NPM_CONFIG_REGISTRY")
                .unwrap_or_else(|_| DEFAULT_REGISTRY.to_string()),
            npm_bin: std::env::var("TAGINDEX_NPM").unwrap_or_else(|_| "npm".to_string()),
        }
    }
}

impl NpmConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific registry
    pub fn new(registry_url: &str) -> Self {
        NpmConfig {
            registry_url: registry_url.to_string(),
            npm_bin: "npm".to_string(),
        }
    }
}

/// Registry client backed by the npm HTTP API and CLI.
pub struct NpmRegistryClient {
    config: NpmConfig,
    http_client: reqwest::Client,
}

/// Escape a package name for use in a registry URL path (`@a/b` -> `@a%2Fb`).
pub fn escape_package_name(name: &str) -> String {
    name.replace('/', "%2F")
}

fn manifest_str<'a>(manifest: &'a Value, field: &str) -> &'a str {
    manifest.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// The throwaway manifest used to pull a published artifact down for comparison.
pub fn validation_manifest(name: &str, version: &str) -> Value {
    json!({
        "name": "validate",
        "version": "0.0.0",
        "private": true,
        "dependencies": { name: version },
    })
}

impl NpmRegistryClient {
    pub fn new(config: NpmConfig) -> RemoteResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("tagindex/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(NpmRegistryClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> RemoteResult<Self> {
        Self::new(NpmConfig::from_env())
    }

    fn registry<'a>(&'a self, registry: Option<&'a str>) -> &'a str {
        registry.unwrap_or(&self.config.registry_url)
    }

    async fn run_npm(&self, args: &[&str], cwd: &Path) -> RemoteResult<String> {
        debug!(npm = %self.config.npm_bin, ?args, cwd = %cwd.display(), "running npm");
        let output = Command::new(&self.config.npm_bin)
            .args(args)
            .current_dir(cwd)
            .output()
            .await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(RemoteError::Command {
                program: format!("npm {}", args.first().copied().unwrap_or_default()),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl RegistryClient for NpmRegistryClient {
    async fn fetch_metadata(&self, name: &str, registry: Option<&str>) -> RemoteResult<RemoteInfo> {
        let url = format!(
            "{}/{}",
            self.registry(registry).trim_end_matches('/'),
            escape_package_name(name)
        );
        debug!(%url, "fetching packument");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound {
                name: name.to_string(),
            });
        }
        let doc: Value = response.error_for_status()?.json().await?;
        RemoteInfo::from_packument(&doc)
    }

    async fn publish(
        &self,
        manifest: &Value,
        files: &[ArtifactFile],
        registry: Option<&str>,
    ) -> RemoteResult<()> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(
            dir.path().join("package.json"),
            serde_json::to_vec_pretty(manifest)?,
        )
        .await?;
        for file in files {
            tokio::fs::write(dir.path().join(&file.path), &file.contents).await?;
        }

        let registry = self.registry(registry);
        let name = manifest_str(manifest, "name");
        let version = manifest_str(manifest, "version");
        info!(%name, %version, %registry, "publishing");
        // Publish under `next` so `latest` only moves after validation.
        self.run_npm(
            &["publish", "--tag", "next", "--registry", registry],
            dir.path(),
        )
        .await?;
        Ok(())
    }

    async fn add_dist_tag(
        &self,
        name: &str,
        version: &str,
        tag: &str,
        registry: Option<&str>,
    ) -> RemoteResult<()> {
        let pkg = format!("{}@{}", name, version);
        let registry = self.registry(registry);
        info!(%pkg, %tag, %registry, "adding dist-tag");
        let cwd = std::env::temp_dir();
        self.run_npm(&["dist-tag", "add", &pkg, tag, "--registry", registry], &cwd)
            .await?;
        Ok(())
    }

    async fn install(
        &self,
        name: &str,
        version: &str,
        registry: Option<&str>,
    ) -> RemoteResult<Value> {
        let dir = tempfile::tempdir()?;
        tokio::fs::write(
            dir.path().join("package.json"),
            serde_json::to_vec_pretty(&validation_manifest(name, version))?,
        )
        .await?;

        let registry = self.registry(registry);
        self.run_npm(
            &[
                "install",
                "--no-audit",
                "--no-fund",
                "--ignore-scripts",
                "--registry",
                registry,
            ],
            dir.path(),
        )
        .await?;

        let index_path = dir.path().join("node_modules").join(name).join("index.json");
        let bytes = tokio::fs::read(&index_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RemoteError::VersionNotFound {
                    name: name.to_string(),
                    version: version.to_string(),
                }
            } else {
                RemoteError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
