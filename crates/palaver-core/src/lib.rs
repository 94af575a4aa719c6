//! Palaver core crate - configuration, error type, and shared domain records.

pub mod config;
pub mod error;
pub mod types;

pub use config::PalaverConfig;
pub use error::{PalaverError, Result};
pub use types::*;
