use serde::{Deserialize, Serialize};

use crate::config::{ChannelConfig, WorkflowConfig};
use crate::version::Semver;

/// Entry point file of the published artifact.
pub const INDEX_FILE: &str = "index.json";
pub const README_FILE: &str = "README.md";
pub const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishConfig {
    pub registry: String,
    pub access: String,
}

/// `package.json` accompanying one publish. Built once per attempt and never
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    pub repository: Repository,
    pub keywords: Vec<String>,
    pub author: String,
    pub license: String,
    pub main: String,
    pub files: Vec<String>,
    /// Digest of `index.json`; read back on the next run to detect changes.
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_config: Option<PublishConfig>,
}

impl PackageManifest {
    pub fn new(
        config: &WorkflowConfig,
        channel: &ChannelConfig,
        version: &Semver,
        content_hash: &str,
    ) -> Self {
        let publish_config = match (&channel.registry_url, channel.mirror) {
            (Some(registry), true) => Some(PublishConfig {
                registry: registry.clone(),
                access: "public".to_string(),
            }),
            _ => None,
        };

        Self {
            name: channel.package_name.clone(),
            version: version.to_string(),
            description: config.description.clone(),
            repository: Repository {
                kind: "git".to_string(),
                url: config.repository_url.clone(),
            },
            keywords: config.keywords.clone(),
            author: config.author.clone(),
            license: config.license.clone(),
            main: INDEX_FILE.to_string(),
            files: vec![INDEX_FILE.to_string(), README_FILE.to_string()],
            content_hash: content_hash.to_string(),
            publish_config,
        }
    }
}
