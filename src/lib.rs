//! tradefloor - Core Library
//! Multi-team mock stock-trading simulation engine

// Public modules
pub mod circuit;
pub mod core;
pub mod engine;
pub mod events;
pub mod negotiation;
pub mod phase;
pub mod platform;
pub mod session;
pub mod shorts;

// Re-exports
pub use crate::core::{Error, Result, Settings};
pub use crate::platform::{PlatformHandle, spawn};
