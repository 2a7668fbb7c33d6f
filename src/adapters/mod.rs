//! Concrete collaborators for the publishing pipeline
//!
//! File-backed adapters for running the CLI locally, an HTTP content
//! source, and in-memory versions of everything for tests and demos.

pub mod fs_store;
pub mod http_source;
pub mod json_repository;
pub mod jsonl_audit;
pub mod log_notifier;
pub mod memory;

pub use fs_store::FsArtifactStore;
pub use http_source::HttpContentSource;
pub use json_repository::JsonCourseRepository;
pub use jsonl_audit::{AuditRecord, JsonlAuditLog};
pub use log_notifier::LogNotifier;
pub use memory::{
    MemoryArtifactStore, MemoryAuditLog, MemoryContentSource, MemoryCourseRepository,
    MemoryNotifier, sample_content,
};
