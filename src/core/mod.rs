pub mod config;
pub mod config_loader;
pub mod course;
pub mod error;
pub mod phase;
pub mod retry;
pub mod status;
pub mod traits;

pub use config::*;
pub use config_loader::{ConfigLoadOptions, ConfigLoader};
pub use course::*;
pub use error::*;
pub use phase::*;
pub use retry::*;
pub use status::*;
pub use traits::*;
