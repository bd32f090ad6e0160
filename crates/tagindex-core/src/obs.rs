//! Structured observability hooks for the publish workflow.
//!
//! This module provides:
//! - Channel-scoped tracing spans via `WorkflowSpan`
//! - Emission functions with a stable `event` field for decisions, state
//!   transitions, validation results and channel failures

use tracing::{info, warn};

/// Channel-scoped span for one workflow run.
///
/// The workflow is async, so the span is attached with
/// `tracing::Instrument` rather than entered.
///
/// # Example
///
/// ```ignore
/// let span = WorkflowSpan::new("primary");
/// run_channel().instrument(span.span()).await;
/// // everything logged inside carries channel = "primary" and the run id
/// ```
pub struct WorkflowSpan {
    run_id: String,
    span: tracing::Span,
}

impl WorkflowSpan {
    /// Create a span tagged with the channel and a fresh run id.
    pub fn new(channel: &str) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("tagindex.channel", channel = %channel, run_id = %run_id);
        Self { run_id, span }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn span(&self) -> tracing::Span {
        self.span.clone()
    }
}

/// Emit event: publish decision computed for a channel.
pub fn emit_decision_made(channel: &str, decision: &str, published: &str, highest: &str) {
    info!(
        event = "decision.made",
        channel = %channel,
        decision = %decision,
        published = %published,
        highest = %highest,
    );
}

/// Emit event: workflow moved to a new state.
pub fn emit_transition(channel: &str, state: &str) {
    info!(event = "workflow.transition", channel = %channel, state = %state);
}

/// Emit event: key present in the older document but gone from the newer one.
pub fn emit_deprecated_key(path: &str) {
    warn!(event = "validation.deprecated_key", path = %path, "key assumed deprecated");
}

/// Emit event: consistency validation succeeded.
pub fn emit_validation_passed(channel: &str, compared: usize, deprecated: usize) {
    info!(
        event = "validation.passed",
        channel = %channel,
        compared = compared,
        deprecated = deprecated,
    );
}

/// Emit event: a channel's workflow failed (warning level).
pub fn emit_channel_failed(channel: &str, fatal: bool, error: &dyn std::fmt::Display) {
    warn!(event = "channel.failed", channel = %channel, fatal = fatal, error = %error);
}

/// Emit event: all channels finished.
pub fn emit_run_finished(channels: usize, failed: usize, duration_ms: u64) {
    info!(
        event = "run.finished",
        channels = channels,
        failed = failed,
        duration_ms = duration_ms,
    );
}
