//! Multi-channel orchestrator.
//!
//! Runs the [`PublishWorkflow`] for every configured channel against the same
//! read-only [`Registry`]. Channels are independent: a failure is recorded as
//! [`ChannelResult::Failed`] and the remaining channels still run. Publishing
//! across channels is best-effort, not atomic.

use std::time::Instant;

use futures::future::join_all;

use crate::config::WorkflowConfig;
use crate::domain::error::{Result, TagIndexError};
use crate::domain::registry::{PackageSummary, Registry};
use crate::obs;
use crate::registry_builder::{self, MetadataLookup};
use crate::workflow::{ChannelOutcome, Collaborators, PublishWorkflow};

/// Per-channel result collected by the orchestrator.
#[derive(Debug)]
pub enum ChannelResult {
    Completed(ChannelOutcome),
    Failed {
        channel: String,
        error: TagIndexError,
    },
}

impl ChannelResult {
    pub fn channel(&self) -> &str {
        match self {
            ChannelResult::Completed(outcome) => &outcome.channel,
            ChannelResult::Failed { channel, .. } => channel,
        }
    }

    pub fn outcome(&self) -> Option<&ChannelOutcome> {
        match self {
            ChannelResult::Completed(outcome) => Some(outcome),
            ChannelResult::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TagIndexError> {
        match self {
            ChannelResult::Completed(_) => None,
            ChannelResult::Failed { error, .. } => Some(error),
        }
    }
}

/// Results of every channel, in configuration order.
#[derive(Debug)]
pub struct RunReport {
    pub results: Vec<ChannelResult>,
}

impl RunReport {
    pub fn get(&self, channel: &str) -> Option<&ChannelResult> {
        self.results.iter().find(|r| r.channel() == channel)
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.error().is_some()).count()
    }

    /// Whether any channel failed with anything other than a refused publish.
    pub fn has_fatal(&self) -> bool {
        self.results
            .iter()
            .filter_map(ChannelResult::error)
            .any(TagIndexError::is_fatal)
    }
}

pub struct Orchestrator {
    config: WorkflowConfig,
    env: Collaborators,
}

impl Orchestrator {
    pub fn new(config: WorkflowConfig, env: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, env })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Build the registry from cached metadata, then run every channel.
    ///
    /// A missing cache entry fails before any channel starts.
    pub async fn run_from_cache<L>(
        &self,
        packages: &[PackageSummary],
        lookup: &L,
    ) -> Result<RunReport>
    where
        L: MetadataLookup + ?Sized,
    {
        let registry = registry_builder::build(packages, lookup)?;
        Ok(self.run(&registry).await)
    }

    /// Run every channel concurrently against `registry`.
    pub async fn run(&self, registry: &Registry) -> RunReport {
        let started = Instant::now();

        let runs = self.config.channels.iter().map(|channel| async move {
            let workflow = PublishWorkflow::new(&self.config, channel, &self.env);
            match workflow.run(registry).await {
                Ok(outcome) => ChannelResult::Completed(outcome),
                Err(error) => {
                    obs::emit_channel_failed(&channel.id, error.is_fatal(), &error);
                    ChannelResult::Failed {
                        channel: channel.id.clone(),
                        error,
                    }
                }
            }
        });
        let results = join_all(runs).await;

        let report = RunReport { results };
        obs::emit_run_finished(
            report.results.len(),
            report.failed_count(),
            started.elapsed().as_millis() as u64,
        );
        report
    }
}
