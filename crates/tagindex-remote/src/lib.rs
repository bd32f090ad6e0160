//! tagindex-remote: external collaborators for the tagindex publisher
//!
//! Everything the publish workflow needs from the outside world sits behind
//! a trait here, so the decision and validation logic can run against
//! in-memory fakes.
//!
//! ## Key Components
//!
//! - `RegistryClient`: fetch packuments, publish, move dist-tags, install
//! - `NpmRegistryClient`: npm HTTP API + CLI implementation
//! - `OutputSink` / `FsOutputSink`: generated file emission
//! - `Clock` / `Delay`: time source and cool-down wait

mod collaborators;
mod error;
pub mod fakes;
mod fs_sink;
pub mod npm;
mod system;

pub use collaborators::{
    ArtifactFile, Clock, ContentDigest, Delay, OutputSink, RegistryClient, RemoteInfo,
    RemoteResult, VersionMetadata,
};
pub use error::RemoteError;
pub use fs_sink::FsOutputSink;
pub use npm::{NpmConfig, NpmRegistryClient};
pub use system::{SystemClock, TokioDelay};
