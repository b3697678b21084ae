//! # logbeam-core
//!
//! Core types, traits, and abstractions for logbeam's real-time distribution
//! and notification dispatch engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the store backends, realtime hub, and dispatcher depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{project_from_topic, relay_topic, DistributionEvent, ViewerEnvelope};
pub use models::*;
pub use traits::*;
