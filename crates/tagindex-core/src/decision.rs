//! Publish decision engine.
//!
//! Looks at what is live for the registry artifact and at the digest of the
//! freshly built registry, and decides between re-promoting a stranded
//! version, publishing a new patch release, or doing nothing.

use std::fmt;

use chrono::{DateTime, Utc};
use tagindex_remote::RemoteInfo;

use crate::domain::error::{Result, TagIndexError};
use crate::domain::registry::LATEST_TAG;
use crate::version::{max_of, Semver};

/// Tag that always tracks the highest version ever published.
pub const NEXT_TAG: &str = "next";

/// Why nothing is published this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoOpReason {
    /// Fresh content digest equals the published one.
    Unchanged,
    /// Content changed but the current release is younger than the minimum age.
    TooRecent,
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoOpReason::Unchanged => write!(f, "unchanged"),
            NoOpReason::TooRecent => write!(f, "too recent"),
        }
    }
}

/// Outcome of [`PublishDecisionEngine::decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishDecision {
    /// A previous run published this version but never moved `latest` to it.
    RePromote(Semver),
    /// Publish this new version.
    PublishNew(Semver),
    NoOp(NoOpReason),
}

impl PublishDecision {
    pub fn kind(&self) -> &'static str {
        match self {
            PublishDecision::RePromote(_) => "re_promote",
            PublishDecision::PublishNew(_) => "publish_new",
            PublishDecision::NoOp(_) => "no_op",
        }
    }
}

impl fmt::Display for PublishDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishDecision::RePromote(v) => write!(f, "re-promote {}", v),
            PublishDecision::PublishNew(v) => write!(f, "publish {}", v),
            PublishDecision::NoOp(reason) => write!(f, "no-op ({})", reason),
        }
    }
}

/// The decision together with the versions it was derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Version `latest` points at.
    pub published: Semver,
    /// Highest version ever published (equal to `next`).
    pub highest: Semver,
    /// `contentHash` of the published version; empty when absent.
    pub published_content_hash: String,
    pub decision: PublishDecision,
}

#[derive(Debug, Clone)]
pub struct PublishDecisionEngine {
    min_republish_age: chrono::Duration,
}

impl Default for PublishDecisionEngine {
    fn default() -> Self {
        Self::new(chrono::Duration::days(7))
    }
}

impl PublishDecisionEngine {
    pub fn new(min_republish_age: chrono::Duration) -> Self {
        Self { min_republish_age }
    }

    pub fn decide(
        &self,
        remote: &RemoteInfo,
        fresh_content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<PublishDecision> {
        Ok(self.assess(remote, fresh_content_hash, now)?.decision)
    }

    pub fn assess(
        &self,
        remote: &RemoteInfo,
        fresh_content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Assessment> {
        let latest_label = remote.tag(LATEST_TAG).ok_or_else(|| {
            TagIndexError::InvariantViolation("artifact has no latest tag".to_string())
        })?;
        let published = Semver::parse(latest_label)?;
        if (published.major, published.minor) != (0, 1) {
            return Err(TagIndexError::InvariantViolation(format!(
                "artifact version {} is outside the 0.1.x line",
                published
            )));
        }

        let highest = max_of(remote.versions.keys())?;
        let next = remote.tag(NEXT_TAG).and_then(Semver::parse_tolerant);
        if next.as_ref() != Some(&highest) {
            return Err(TagIndexError::InvariantViolation(format!(
                "next tag ({}) does not track the highest published version {}",
                remote.tag(NEXT_TAG).unwrap_or("missing"),
                highest
            )));
        }

        let published_content_hash = remote
            .versions
            .get(latest_label)
            .and_then(|meta| meta.content_hash.clone())
            .unwrap_or_default();

        let decision = if highest != published {
            PublishDecision::RePromote(highest.clone())
        } else if published_content_hash == fresh_content_hash {
            PublishDecision::NoOp(NoOpReason::Unchanged)
        } else if now - remote.last_modified < self.min_republish_age {
            PublishDecision::NoOp(NoOpReason::TooRecent)
        } else {
            PublishDecision::PublishNew(published.next_patch())
        };

        Ok(Assessment {
            published,
            highest,
            published_content_hash,
            decision,
        })
    }
}
