//! Shared configuration, error type and domain records for Haven.

pub mod config;
pub mod error;
pub mod types;

pub use config::HavenConfig;
pub use error::{HavenError, Result};
pub use types::*;
