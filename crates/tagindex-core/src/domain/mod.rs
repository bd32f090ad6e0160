//! Domain models for tagindex.
//!
//! Canonical definitions for the core entities:
//! - `Registry`: the aggregated dist-tag document being published
//! - `PackageSummary`: one upstream package tracked by the registry
//! - `PackageManifest`: the `package.json` shipped with each publish

pub mod error;
pub mod manifest;
pub mod registry;

// Re-export main types and errors
pub use error::{Result, TagIndexError};
pub use manifest::{PackageManifest, PublishConfig, Repository};
pub use registry::{PackageSummary, Registry, LATEST_TAG};
