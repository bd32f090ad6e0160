//! Run configuration for the publish workflow.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! `TAGINDEX_*` environment variables. The CLI applies its flags last.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, TagIndexError};

/// One publish destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Stable identifier, also the output sub-directory.
    pub id: String,
    /// Package name the artifact is published under.
    pub package_name: String,
    /// Registry URL; `None` uses the client default.
    #[serde(default)]
    pub registry_url: Option<String>,
    /// Mirror channels carry `publishConfig` in their manifest.
    #[serde(default)]
    pub mirror: bool,
}

impl ChannelConfig {
    pub fn primary(package_name: &str) -> Self {
        Self {
            id: "primary".to_string(),
            package_name: package_name.to_string(),
            registry_url: None,
            mirror: false,
        }
    }

    pub fn mirror(package_name: &str, registry_url: &str) -> Self {
        Self {
            id: "mirror".to_string(),
            package_name: package_name.to_string(),
            registry_url: Some(registry_url.to_string()),
            mirror: true,
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry_url.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub output_dir: PathBuf,
    pub description: String,
    pub repository_url: String,
    pub keywords: Vec<String>,
    pub author: String,
    pub license: String,
    pub readme: String,
    /// Wait between publish and validation, in seconds.
    pub cooldown_secs: u64,
    /// Minimum age of the current release before a content change is published.
    pub min_republish_age_days: i64,
    pub dry_run: bool,
    pub channels: Vec<ChannelConfig>,
}

pub const DEFAULT_PACKAGE_NAME: &str = "@tagindex/registry";
pub const DEFAULT_MIRROR_REGISTRY: &str = "https://npm.pkg.github.com";
/// Upper bound on `min_republish_age_days` (about a century).
pub const MAX_REPUBLISH_AGE_DAYS: i64 = 36_500;

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("dist"),
            description: "Dist-tags of every tracked package, in one document".to_string(),
            repository_url: "https://github.com/stevedores-org/tagindex".to_string(),
            keywords: vec![
                "dist-tags".to_string(),
                "registry".to_string(),
                "versions".to_string(),
            ],
            author: "Stevedores Org <engineering@stevedores.org>".to_string(),
            license: "Apache-2.0".to_string(),
            readme: "# tagindex registry\n\n`index.json` maps each tracked package to its \
                     dist-tags. Tags that point at the same version as `latest` are omitted.\n"
                .to_string(),
            cooldown_secs: 60,
            min_republish_age_days: 7,
            dry_run: false,
            channels: vec![
                ChannelConfig::primary(DEFAULT_PACKAGE_NAME),
                ChannelConfig::mirror(DEFAULT_PACKAGE_NAME, DEFAULT_MIRROR_REGISTRY),
            ],
        }
    }
}

impl WorkflowConfig {
    /// Defaults, overlaid with `path` (TOML) when given and then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_toml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(input: &str) -> Result<Self> {
        toml::from_str(input).map_err(|e| TagIndexError::Config(e.to_string()))
    }

    /// Apply `TAGINDEX_OUTPUT_DIR` and `TAGINDEX_COOLDOWN_SECS` through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("TAGINDEX_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("TAGINDEX_COOLDOWN_SECS") {
            self.cooldown_secs = secs.parse().map_err(|_| {
                TagIndexError::Config(format!("TAGINDEX_COOLDOWN_SECS is not a number: {}", secs))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(TagIndexError::Config("no channels configured".to_string()));
        }
        if self.min_republish_age_days < 0 {
            return Err(TagIndexError::Config(
                "min_republish_age_days must not be negative".to_string(),
            ));
        }
        if self.min_republish_age_days > MAX_REPUBLISH_AGE_DAYS {
            return Err(TagIndexError::Config(format!(
                "min_republish_age_days must be at most {}",
                MAX_REPUBLISH_AGE_DAYS
            )));
        }
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.id.as_str()) {
                return Err(TagIndexError::Config(format!(
                    "duplicate channel id: {}",
                    channel.id
                )));
            }
            if channel.package_name.trim().is_empty() {
                return Err(TagIndexError::Config(format!(
                    "channel {} has an empty package name",
                    channel.id
                )));
            }
            if channel.mirror && channel.registry_url.is_none() {
                return Err(TagIndexError::Config(format!(
                    "mirror channel {} needs a registry_url",
                    channel.id
                )));
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Clamped to [`MAX_REPUBLISH_AGE_DAYS`] for configs that skipped [`Self::validate`].
    pub fn min_republish_age(&self) -> chrono::Duration {
        let days = self.min_republish_age_days.min(MAX_REPUBLISH_AGE_DAYS);
        chrono::Duration::try_days(days)
            .unwrap_or_else(|| chrono::Duration::days(MAX_REPUBLISH_AGE_DAYS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = WorkflowConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.cooldown(), Duration::from_secs(60));
        assert_eq!(config.min_republish_age(), chrono::Duration::days(7));
        assert_eq!(config.channels.len(), 2);
        assert!(config.channels[1].mirror);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = WorkflowConfig::from_toml(
            r#"
            output_dir = "out"
            cooldown_secs = 5

            [[channels]]
            id = "primary"
            package_name = "@acme/tags"
            "#,
        )
        .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.cooldown_secs, 5);
        assert_eq!(config.min_republish_age_days, 7);
        assert_eq!(config.channels, vec![ChannelConfig::primary("@acme/tags")]);
    }

    #[test]
    fn test_huge_republish_age_is_config_error() {
        let config = WorkflowConfig {
            min_republish_age_days: i64::MAX,
            ..WorkflowConfig::default()
        };
        assert!(matches!(config.validate(), Err(TagIndexError::Config(_))));
        assert_eq!(
            config.min_republish_age(),
            chrono::Duration::days(MAX_REPUBLISH_AGE_DAYS)
        );

        let config = WorkflowConfig::from_toml("min_republish_age_days = 36500").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = WorkflowConfig::from_toml("cooldown_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, TagIndexError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = WorkflowConfig::default();
        config
            .apply_env(|key| match key {
                "TAGINDEX_OUTPUT_DIR" => Some("/tmp/tags".to_string()),
                "TAGINDEX_COOLDOWN_SECS" => Some("0".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/tags"));
        assert_eq!(config.cooldown_secs, 0);

        let err = config
            .apply_env(|key| (key == "TAGINDEX_COOLDOWN_SECS").then(|| "x".to_string()))
            .unwrap_err();
        assert!(matches!(err, TagIndexError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_bad_channels() {
        let mut config = WorkflowConfig {
            channels: vec![],
            ..WorkflowConfig::default()
        };
        assert!(config.validate().is_err());

        config.channels = vec![
            ChannelConfig::primary("a"),
            ChannelConfig::primary("b"),
        ];
        assert!(config.validate().is_err());

        config.channels = vec![ChannelConfig {
            registry_url: None,
            ..ChannelConfig::mirror("a", "https://m")
        }];
        assert!(config.validate().is_err());

        config.channels = vec![ChannelConfig::primary(" ")];
        assert!(config.validate().is_err());
    }
}
