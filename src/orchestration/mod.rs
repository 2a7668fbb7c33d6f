//! Orchestration layer for course publishing
//!
//! The watcher gates runs per course, the pipeline drives one run through
//! its phases, and the publisher facade ties them to the repository and
//! the audit log. The rule runner is a batch caller of the facade.

pub mod packager;
pub mod pipeline;
pub mod publisher;
pub mod rule_runner;
pub mod watcher;

// Re-export main types for convenience
pub use packager::{ArtifactManifest, CourseArtifact, PackagedArtifact};
pub use pipeline::{PublishPipeline, RunReport};
pub use publisher::Publisher;
pub use rule_runner::{RuleOutcome, RuleRunSummary, RuleRunner};
pub use watcher::{Acquisition, PublisherWatcher, RunTicket};
