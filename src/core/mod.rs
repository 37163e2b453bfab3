//! Core module - common types, settings, and error handling

pub mod config;
pub mod error;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};
pub use types::*;
