//! tagindex core library
//!
//! Decides whether the aggregated dist-tag registry needs a new release,
//! proves a release is consistent with the previous one, and sequences
//! publish, cool-down, validation and promotion per channel.

pub mod config;
pub mod consistency;
pub mod decision;
pub mod domain;
pub mod obs;
pub mod orchestrator;
pub mod registry_builder;
pub mod telemetry;
pub mod version;
pub mod workflow;

pub use config::{ChannelConfig, WorkflowConfig};
pub use consistency::{
    assert_newer_is_superset_of_older, validate_documents, JsonValue, ValidationReport,
};
pub use decision::{Assessment, NoOpReason, PublishDecision, PublishDecisionEngine};
pub use domain::{PackageManifest, PackageSummary, Registry, Result, TagIndexError};
pub use orchestrator::{ChannelResult, Orchestrator, RunReport};
pub use registry_builder::{build as build_registry, load_package_list, FsMetadataCache, MetadataLookup};
pub use telemetry::init_tracing;
pub use version::{compare, max_of, Semver};
pub use workflow::{ChannelOutcome, Collaborators, PublishWorkflow, WorkflowState};

/// tagindex version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
