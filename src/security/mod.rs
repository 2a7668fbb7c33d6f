pub mod credentials;

pub use credentials::{SourceCredentials, mask_token};
