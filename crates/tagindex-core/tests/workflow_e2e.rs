//! End-to-end workflow tests against the in-memory collaborators.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tagindex_core::{
    ChannelConfig, ChannelResult, Collaborators, NoOpReason, Orchestrator, PackageSummary,
    PublishDecision, Registry, Semver, TagIndexError, WorkflowConfig, WorkflowState,
};
use tagindex_remote::fakes::{
    FixedClock, MemoryOutputSink, MemoryRegistryClient, RecordingDelay, RegistryCall,
};
use tagindex_remote::{RemoteError, RemoteInfo, VersionMetadata};

const ARTIFACT: &str = "@tagindex/registry";
const MIRROR_ARTIFACT: &str = "@tagindex-mirror/registry";
const MIRROR: &str = "https://mirror.example.com";

struct Harness {
    client: Arc<MemoryRegistryClient>,
    sink: Arc<MemoryOutputSink>,
    clock: Arc<FixedClock>,
    delay: Arc<RecordingDelay>,
}

impl Harness {
    fn new() -> Self {
        Self {
            client: Arc::new(MemoryRegistryClient::new()),
            sink: Arc::new(MemoryOutputSink::new()),
            clock: Arc::new(FixedClock::new(now())),
            delay: Arc::new(RecordingDelay::new()),
        }
    }

    fn env(&self) -> Collaborators {
        Collaborators {
            client: self.client.clone(),
            sink: self.sink.clone(),
            clock: self.clock.clone(),
            delay: self.delay.clone(),
        }
    }

    fn orchestrator(&self, config: WorkflowConfig) -> Orchestrator {
        Orchestrator::new(config, self.env()).expect("valid config")
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
}

fn days_ago(days: i64) -> DateTime<Utc> {
    now() - chrono::Duration::days(days)
}

fn primary_only(dry_run: bool) -> WorkflowConfig {
    WorkflowConfig {
        dry_run,
        channels: vec![ChannelConfig::primary(ARTIFACT)],
        ..WorkflowConfig::default()
    }
}

fn fresh_registry() -> Registry {
    let mut registry = Registry::default();
    registry.entries.insert(
        "react".to_string(),
        BTreeMap::from([
            ("latest".to_string(), "18.2.0".to_string()),
            ("next".to_string(), "19.0.0-rc.1".to_string()),
        ]),
    );
    registry.entries.insert(
        "left-pad".to_string(),
        BTreeMap::from([("latest".to_string(), "1.3.0".to_string())]),
    );
    registry
}

fn older_index() -> Value {
    json!({
        "entries": {
            "react": { "latest": "18.1.0", "next": "19.0.0-beta.0" },
            "left-pad": { "latest": "1.3.0" },
            "retired-pkg": { "latest": "0.0.1" }
        }
    })
}

fn artifact_info(latest: &str, next: &str, versions: &[(&str, &str)], modified: DateTime<Utc>) -> RemoteInfo {
    RemoteInfo {
        dist_tags: BTreeMap::from([
            ("latest".to_string(), latest.to_string()),
            ("next".to_string(), next.to_string()),
        ]),
        versions: versions
            .iter()
            .map(|(v, h)| {
                (
                    v.to_string(),
                    VersionMetadata {
                        content_hash: Some(h.to_string()),
                    },
                )
            })
            .collect(),
        last_modified: modified,
    }
}

fn completed(result: &ChannelResult) -> &tagindex_core::ChannelOutcome {
    match result {
        ChannelResult::Completed(outcome) => outcome,
        ChannelResult::Failed { channel, error } => {
            panic!("channel {} failed: {:?}", channel, error)
        }
    }
}

// ---------------------------------------------------------------------------
// PublishNew
// ---------------------------------------------------------------------------

#[tokio::test]
async fn changed_content_publishes_validates_and_promotes() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(10)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;
    let outcome = completed(&report.results[0]);

    assert_eq!(
        outcome.decision,
        PublishDecision::PublishNew(Semver::parse("0.1.11").unwrap())
    );
    assert_eq!(
        outcome.trail,
        vec![
            WorkflowState::Built,
            WorkflowState::Published,
            WorkflowState::CoolingDown,
            WorkflowState::Validated,
            WorkflowState::Promoted,
        ]
    );
    assert_eq!(outcome.final_state(), Some(WorkflowState::Promoted));
    assert_eq!(h.delay.requests(), vec![Duration::from_secs(60)]);

    let calls = h.client.calls();
    assert_eq!(
        calls.last(),
        Some(&RegistryCall::AddDistTag {
            name: ARTIFACT.to_string(),
            version: "0.1.11".to_string(),
            tag: "latest".to_string(),
        })
    );
    let publish_at = calls
        .iter()
        .position(|c| matches!(c, RegistryCall::Publish { .. }))
        .expect("published");
    let install_at = calls
        .iter()
        .position(|c| matches!(c, RegistryCall::Install { version, .. } if version == "0.1.11"))
        .expect("installed");
    assert!(publish_at < install_at, "validation must follow publish");

    let live = h.client.package(None, ARTIFACT).unwrap();
    assert_eq!(live.tag("latest"), Some("0.1.11"));
    assert_eq!(live.tag("next"), Some("0.1.11"));
    let digest = fresh_registry().content_digest().unwrap();
    assert_eq!(
        live.versions["0.1.11"].content_hash.as_deref(),
        Some(digest.as_str())
    );
}

#[tokio::test]
async fn output_files_are_written_per_channel() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(10)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());

    h.orchestrator(primary_only(false)).run(&fresh_registry()).await;

    assert_eq!(
        h.sink.paths(),
        vec![
            "primary/README.md".to_string(),
            "primary/index.json".to_string(),
            "primary/package.json".to_string(),
        ]
    );
    let manifest: Value = serde_json::from_slice(&h.sink.get("primary/package.json").unwrap()).unwrap();
    assert_eq!(manifest["version"], "0.1.11");
    assert_eq!(manifest["name"], ARTIFACT);
    assert!(manifest.get("publishConfig").is_none());

    let index = Registry::from_json(
        std::str::from_utf8(&h.sink.get("primary/index.json").unwrap()).unwrap(),
    )
    .unwrap();
    assert_eq!(index, fresh_registry());
}

#[tokio::test]
async fn dry_run_skips_side_effects_but_still_validates() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(10)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());

    let report = h.orchestrator(primary_only(true)).run(&fresh_registry()).await;
    let outcome = completed(&report.results[0]);

    assert!(outcome.dry_run);
    assert_eq!(outcome.final_state(), Some(WorkflowState::Promoted));
    assert!(h.delay.requests().is_empty());
    assert_eq!(
        h.client.calls(),
        vec![
            RegistryCall::FetchMetadata {
                name: ARTIFACT.to_string()
            },
            RegistryCall::Install {
                name: ARTIFACT.to_string(),
                version: "0.1.10".to_string()
            },
        ]
    );
    assert_eq!(
        h.client.package(None, ARTIFACT).unwrap().tag("latest"),
        Some("0.1.10")
    );
    assert!(h.sink.get("primary/index.json").is_some());
}

#[tokio::test]
async fn regression_after_publish_blocks_promotion() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(10)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());
    // The registry serves a stale tarball for the version just uploaded.
    h.client.override_installed(
        None,
        ARTIFACT,
        "0.1.11",
        json!({ "entries": { "react": { "latest": "18.3.0" } } }),
    );

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;

    let error = report.results[0].error().expect("channel fails");
    assert!(
        matches!(error, TagIndexError::RegressionDetected { path, .. } if path == "$.entries.react.latest")
    );
    assert!(report.has_fatal());
    assert_eq!(h.delay.requests(), vec![Duration::from_secs(60)]);
    let calls = h.client.calls();
    assert!(calls
        .iter()
        .any(|c| matches!(c, RegistryCall::Publish { version, .. } if version == "0.1.11")));
    assert!(!calls
        .iter()
        .any(|c| matches!(c, RegistryCall::AddDistTag { .. })));

    let live = h.client.package(None, ARTIFACT).unwrap();
    assert_eq!(live.tag("latest"), Some("0.1.10"));
    assert_eq!(live.tag("next"), Some("0.1.11"));
}

// ---------------------------------------------------------------------------
// RePromote
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stranded_version_is_validated_then_promoted() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info(
            "0.1.6",
            "0.1.7",
            &[("0.1.6", "H1"), ("0.1.7", "H2")],
            days_ago(1),
        ),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.6", older_index());
    h.client
        .insert_artifact(None, ARTIFACT, "0.1.7", fresh_registry().to_value().unwrap());

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;
    let outcome = completed(&report.results[0]);

    assert_eq!(
        outcome.decision,
        PublishDecision::RePromote(Semver::parse("0.1.7").unwrap())
    );
    assert_eq!(
        outcome.trail,
        vec![WorkflowState::Built, WorkflowState::RePromoted]
    );
    assert_eq!(outcome.validation.deprecated, vec!["$.entries.retired-pkg"]);
    assert!(h.delay.requests().is_empty());
    assert!(!h
        .client
        .calls()
        .iter()
        .any(|c| matches!(c, RegistryCall::Publish { .. })));
    assert_eq!(
        h.client.package(None, ARTIFACT).unwrap().tag("latest"),
        Some("0.1.7")
    );
}

#[tokio::test]
async fn regressed_stranded_version_is_never_promoted() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info(
            "0.1.6",
            "0.1.7",
            &[("0.1.6", "H1"), ("0.1.7", "H2")],
            days_ago(1),
        ),
    );
    h.client.insert_artifact(
        None,
        ARTIFACT,
        "0.1.6",
        json!({ "entries": { "react": { "latest": "18.2.0" } } }),
    );
    h.client.insert_artifact(
        None,
        ARTIFACT,
        "0.1.7",
        json!({ "entries": { "react": { "latest": "17.0.2" } } }),
    );

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;

    let error = report.results[0].error().expect("channel fails");
    assert!(
        matches!(error, TagIndexError::RegressionDetected { path, .. } if path == "$.entries.react.latest")
    );
    assert!(report.has_fatal());
    assert!(!h
        .client
        .calls()
        .iter()
        .any(|c| matches!(c, RegistryCall::AddDistTag { .. })));
    assert_eq!(
        h.client.package(None, ARTIFACT).unwrap().tag("latest"),
        Some("0.1.6")
    );
}

// ---------------------------------------------------------------------------
// NoOp
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unchanged_content_is_skipped_after_revalidation() {
    let h = Harness::new();
    let digest = fresh_registry().content_digest().unwrap();
    h.client.insert_package(
        ARTIFACT,
        artifact_info(
            "0.1.10",
            "0.1.10",
            &[("0.1.10", digest.as_str())],
            days_ago(30),
        ),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;
    let outcome = completed(&report.results[0]);

    assert_eq!(outcome.decision, PublishDecision::NoOp(NoOpReason::Unchanged));
    assert_eq!(outcome.trail, vec![WorkflowState::Built, WorkflowState::Skipped]);
    assert_eq!(outcome.version, Semver::parse("0.1.10").unwrap());
    assert!(h.client.calls().iter().any(
        |c| matches!(c, RegistryCall::Install { version, .. } if version == "0.1.10")
    ));
}

#[tokio::test]
async fn recent_release_is_not_replaced() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(3)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;
    let outcome = completed(&report.results[0]);

    assert_eq!(outcome.decision, PublishDecision::NoOp(NoOpReason::TooRecent));
    assert_eq!(outcome.final_state(), Some(WorkflowState::Skipped));
}

#[tokio::test]
async fn no_op_still_catches_local_regression() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(3)),
    );
    h.client.insert_artifact(
        None,
        ARTIFACT,
        "0.1.10",
        json!({ "entries": { "left-pad": { "latest": "2.0.0" } } }),
    );

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;
    assert!(matches!(
        report.results[0].error(),
        Some(TagIndexError::RegressionDetected { .. })
    ));
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

fn two_channels() -> WorkflowConfig {
    WorkflowConfig {
        channels: vec![
            ChannelConfig::primary(ARTIFACT),
            ChannelConfig::mirror(MIRROR_ARTIFACT, MIRROR),
        ],
        ..WorkflowConfig::default()
    }
}

#[tokio::test]
async fn primary_publish_failure_does_not_stop_mirror() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(10)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());
    h.client.insert_package_at(
        Some(MIRROR),
        MIRROR_ARTIFACT,
        artifact_info("0.1.4", "0.1.4", &[("0.1.4", "H1")], days_ago(10)),
    );
    h.client
        .insert_artifact(Some(MIRROR), MIRROR_ARTIFACT, "0.1.4", older_index());
    h.client.fail_publish_for(ARTIFACT);

    let report = h.orchestrator(two_channels()).run(&fresh_registry()).await;

    let primary = report.get("primary").unwrap();
    assert!(matches!(primary.error(), Some(TagIndexError::PublishFailed(_))));

    let mirror = completed(report.get("mirror").unwrap());
    assert_eq!(mirror.final_state(), Some(WorkflowState::Promoted));
    assert_eq!(mirror.version, Semver::parse("0.1.5").unwrap());

    assert_eq!(report.failed_count(), 1);
    assert!(!report.has_fatal(), "a refused publish is not fatal");

    let manifest: Value =
        serde_json::from_slice(&h.sink.get("mirror/package.json").unwrap()).unwrap();
    assert_eq!(manifest["publishConfig"]["registry"], MIRROR);
}

#[tokio::test]
async fn failed_metadata_fetch_is_fatal() {
    let h = Harness::new();

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;

    assert!(matches!(
        report.results[0].error(),
        Some(TagIndexError::Remote(RemoteError::NotFound { .. }))
    ));
    assert!(report.has_fatal());
}

#[tokio::test]
async fn failed_validation_install_is_fatal() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.3", "0.1.3", &[("0.1.3", "H1")], days_ago(1)),
    );

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;

    assert!(matches!(
        report.results[0].error(),
        Some(TagIndexError::Remote(RemoteError::VersionNotFound { .. }))
    ));
    assert!(report.has_fatal());
}

#[tokio::test]
async fn failed_promotion_is_fatal() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("0.1.10", "0.1.10", &[("0.1.10", "H1")], days_ago(10)),
    );
    h.client.insert_artifact(None, ARTIFACT, "0.1.10", older_index());
    h.client.fail_dist_tag_for(ARTIFACT);

    let report = h.orchestrator(primary_only(false)).run(&fresh_registry()).await;

    assert!(matches!(
        report.results[0].error(),
        Some(TagIndexError::Remote(RemoteError::Injected(_)))
    ));
    assert!(report.has_fatal());
    assert_eq!(
        h.client.package(None, ARTIFACT).unwrap().tag("latest"),
        Some("0.1.10")
    );
}

#[tokio::test]
async fn invariant_violation_fails_only_its_channel() {
    let h = Harness::new();
    h.client.insert_package(
        ARTIFACT,
        artifact_info("1.0.0", "1.0.0", &[("1.0.0", "H1")], days_ago(10)),
    );
    h.client.insert_package_at(
        Some(MIRROR),
        MIRROR_ARTIFACT,
        artifact_info("0.1.4", "0.1.4", &[("0.1.4", "H1")], days_ago(2)),
    );
    h.client
        .insert_artifact(Some(MIRROR), MIRROR_ARTIFACT, "0.1.4", older_index());

    let report = h.orchestrator(two_channels()).run(&fresh_registry()).await;

    assert!(matches!(
        report.get("primary").unwrap().error(),
        Some(TagIndexError::InvariantViolation(_))
    ));
    assert!(report.get("mirror").unwrap().outcome().is_some());
    assert!(report.has_fatal());
}

#[tokio::test]
async fn missing_cache_entries_fail_before_any_channel_runs() {
    let h = Harness::new();
    let cache: HashMap<String, RemoteInfo> = HashMap::new();
    let packages = vec![PackageSummary::new("react", "react")];

    let err = h
        .orchestrator(primary_only(false))
        .run_from_cache(&packages, &cache)
        .await
        .unwrap_err();

    assert!(matches!(err, TagIndexError::MissingCachedInfo { ref packages } if packages == &["react"]));
    assert!(h.client.calls().is_empty());
    assert!(h.sink.paths().is_empty());
}

#[tokio::test]
async fn invalid_config_is_rejected_up_front() {
    let h = Harness::new();
    let config = WorkflowConfig {
        channels: vec![],
        ..WorkflowConfig::default()
    };
    assert!(matches!(
        Orchestrator::new(config, h.env()),
        Err(TagIndexError::Config(_))
    ));
}
