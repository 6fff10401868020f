pub mod config;
pub mod error;
pub mod types;

pub use config::RaglineConfig;
pub use error::{RaglineError, Result};
pub use types::*;
