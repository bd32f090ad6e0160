//! Per-channel publish workflow.
//!
//! ```text
//! Built ──PublishNew──▶ Published ─▶ CoolingDown ─▶ Validated ─▶ Promoted
//!   ├───RePromote─────▶ RePromoted      (validated before tagging)
//!   └───NoOp──────────▶ Skipped         (live artifact re-validated)
//! ```
//!
//! `latest` is only ever moved after the consistency check passes. Publishing
//! goes to `next` first, so a crash between publish and promote leaves a
//! version that the next run detects and re-promotes.
//!
//! In dry-run mode publish, cool-down and tagging are skipped; output is still
//! written and validation still runs against whatever is live.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tagindex_remote::{ArtifactFile, Clock, Delay, OutputSink, RegistryClient};
use tracing::{info, Instrument};

use crate::config::{ChannelConfig, WorkflowConfig};
use crate::consistency::{validate_documents, ValidationReport};
use crate::decision::{Assessment, PublishDecision, PublishDecisionEngine};
use crate::domain::error::{Result, TagIndexError};
use crate::domain::manifest::{PackageManifest, INDEX_FILE, MANIFEST_FILE, README_FILE};
use crate::domain::registry::{Registry, LATEST_TAG};
use crate::obs::{self, WorkflowSpan};
use crate::version::Semver;

/// Workflow states. `Promoted`, `RePromoted` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowState {
    Built,
    Published,
    CoolingDown,
    Validated,
    Promoted,
    RePromoted,
    Skipped,
}

impl WorkflowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Built => "built",
            WorkflowState::Published => "published",
            WorkflowState::CoolingDown => "cooling_down",
            WorkflowState::Validated => "validated",
            WorkflowState::Promoted => "promoted",
            WorkflowState::RePromoted => "re_promoted",
            WorkflowState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Promoted | WorkflowState::RePromoted | WorkflowState::Skipped
        )
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External collaborators shared by every channel of a run.
#[derive(Clone)]
pub struct Collaborators {
    pub client: Arc<dyn RegistryClient>,
    pub sink: Arc<dyn OutputSink>,
    pub clock: Arc<dyn Clock>,
    pub delay: Arc<dyn Delay>,
}

/// Result of a completed channel workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelOutcome {
    pub channel: String,
    pub decision: PublishDecision,
    /// Version written into the manifest for this run.
    pub version: Semver,
    /// States visited, in order.
    pub trail: Vec<WorkflowState>,
    pub validation: ValidationReport,
    pub dry_run: bool,
}

impl ChannelOutcome {
    pub fn final_state(&self) -> Option<WorkflowState> {
        self.trail.last().copied()
    }
}

pub struct PublishWorkflow<'a> {
    config: &'a WorkflowConfig,
    channel: &'a ChannelConfig,
    env: &'a Collaborators,
    engine: PublishDecisionEngine,
}

impl<'a> PublishWorkflow<'a> {
    pub fn new(
        config: &'a WorkflowConfig,
        channel: &'a ChannelConfig,
        env: &'a Collaborators,
    ) -> Self {
        Self {
            config,
            channel,
            env,
            engine: PublishDecisionEngine::new(config.min_republish_age()),
        }
    }

    /// Run the workflow for this channel against the freshly built `registry`.
    pub async fn run(&self, registry: &Registry) -> Result<ChannelOutcome> {
        let span = WorkflowSpan::new(&self.channel.id);
        self.execute(registry).instrument(span.span()).await
    }

    async fn execute(&self, registry: &Registry) -> Result<ChannelOutcome> {
        let digest = registry.content_digest()?;
        let name = self.channel.package_name.as_str();
        let remote = self
            .env
            .client
            .fetch_metadata(name, self.channel.registry())
            .await?;

        let assessment = self
            .engine
            .assess(&remote, digest.as_str(), self.env.clock.now())?;
        obs::emit_decision_made(
            &self.channel.id,
            &assessment.decision.to_string(),
            &assessment.published.to_string(),
            &assessment.highest.to_string(),
        );

        let version = match &assessment.decision {
            PublishDecision::RePromote(v) | PublishDecision::PublishNew(v) => v.clone(),
            PublishDecision::NoOp(_) => assessment.published.clone(),
        };
        let manifest = PackageManifest::new(self.config, self.channel, &version, digest.as_str());
        let files = self.emit_output(registry, &manifest).await?;

        let mut trail = Vec::new();
        self.enter(&mut trail, WorkflowState::Built);

        let validation = match &assessment.decision {
            PublishDecision::PublishNew(v) => {
                self.publish_and_promote(registry, &assessment, v, &manifest, &files, &mut trail)
                    .await?
            }
            PublishDecision::RePromote(v) => {
                self.re_promote(&assessment, v, &mut trail).await?
            }
            PublishDecision::NoOp(reason) => {
                info!(%reason, version = %assessment.published, "nothing to publish");
                let report = self.validate_live(registry, &assessment.published).await?;
                self.enter(&mut trail, WorkflowState::Skipped);
                report
            }
        };

        Ok(ChannelOutcome {
            channel: self.channel.id.clone(),
            decision: assessment.decision,
            version,
            trail,
            validation,
            dry_run: self.config.dry_run,
        })
    }

    /// Built → Published → CoolingDown → Validated → Promoted.
    async fn publish_and_promote(
        &self,
        registry: &Registry,
        assessment: &Assessment,
        version: &Semver,
        manifest: &PackageManifest,
        files: &[ArtifactFile],
        trail: &mut Vec<WorkflowState>,
    ) -> Result<ValidationReport> {
        let target = self.channel.registry();
        let dry_run = self.config.dry_run;

        if dry_run {
            info!(%version, "dry run: skipping publish");
        } else {
            let manifest_json = serde_json::to_value(manifest)?;
            self.env
                .client
                .publish(&manifest_json, files, target)
                .await
                .map_err(TagIndexError::PublishFailed)?;
        }
        self.enter(trail, WorkflowState::Published);

        self.enter(trail, WorkflowState::CoolingDown);
        if dry_run {
            info!("dry run: skipping cool-down");
        } else {
            self.env.delay.sleep(self.config.cooldown()).await;
        }

        // Nothing new exists in dry-run, so check the live release instead.
        let installed_version = if dry_run {
            &assessment.published
        } else {
            version
        };
        let report = self.validate_live(registry, installed_version).await?;
        self.enter(trail, WorkflowState::Validated);

        self.promote(version).await?;
        self.enter(trail, WorkflowState::Promoted);
        Ok(report)
    }

    /// Built → RePromoted, after proving the stranded version does not
    /// regress the one currently tagged `latest`.
    async fn re_promote(
        &self,
        assessment: &Assessment,
        version: &Semver,
        trail: &mut Vec<WorkflowState>,
    ) -> Result<ValidationReport> {
        let candidate = self.install(version).await?;
        let current = self.install(&assessment.published).await?;
        let report = validate_documents(&candidate, &current)?;
        obs::emit_validation_passed(
            &self.channel.id,
            report.compared,
            report.deprecated.len(),
        );

        self.promote(version).await?;
        self.enter(trail, WorkflowState::RePromoted);
        Ok(report)
    }

    /// Install `version` and prove the local registry is not behind it.
    async fn validate_live(
        &self,
        registry: &Registry,
        version: &Semver,
    ) -> Result<ValidationReport> {
        let installed = self.install(version).await?;
        let report = validate_documents(&registry.to_value()?, &installed)?;
        obs::emit_validation_passed(
            &self.channel.id,
            report.compared,
            report.deprecated.len(),
        );
        Ok(report)
    }

    async fn install(&self, version: &Semver) -> Result<Value> {
        Ok(self
            .env
            .client
            .install(
                &self.channel.package_name,
                &version.to_string(),
                self.channel.registry(),
            )
            .await?)
    }

    async fn promote(&self, version: &Semver) -> Result<()> {
        if self.config.dry_run {
            info!(%version, "dry run: not moving latest");
            return Ok(());
        }
        self.env
            .client
            .add_dist_tag(
                &self.channel.package_name,
                &version.to_string(),
                LATEST_TAG,
                self.channel.registry(),
            )
            .await?;
        Ok(())
    }

    /// Write `index.json`, `package.json` and `README.md` under `<channel id>/`.
    ///
    /// Returns the files that make up the package besides its manifest.
    async fn emit_output(
        &self,
        registry: &Registry,
        manifest: &PackageManifest,
    ) -> Result<Vec<ArtifactFile>> {
        let files = vec![
            ArtifactFile::new(INDEX_FILE, registry.to_pretty_json()?.into_bytes()),
            ArtifactFile::new(README_FILE, self.config.readme.clone().into_bytes()),
        ];
        let manifest_bytes = serde_json::to_vec_pretty(manifest)?;

        let dir = &self.channel.id;
        self.env
            .sink
            .write(&format!("{}/{}", dir, MANIFEST_FILE), &manifest_bytes)
            .await?;
        for file in &files {
            self.env
                .sink
                .write(&format!("{}/{}", dir, file.path), &file.contents)
                .await?;
        }
        Ok(files)
    }

    fn enter(&self, trail: &mut Vec<WorkflowState>, state: WorkflowState) {
        obs::emit_transition(&self.channel.id, state.as_str());
        trail.push(state);
    }
}
