pub mod adapters;
pub mod core;
pub mod orchestration;
pub mod security;
pub mod validation;

pub use core::*;
pub use orchestration::{Publisher, PublisherWatcher, RuleRunSummary, RuleRunner};
pub use security::{SourceCredentials, mask_token};
pub use validation::{ContentReport, ContentValidator};
