//! # logbeam-realtime
//!
//! Live viewer fan-out for logbeam.
//!
//! - [`hub`]: the per-process registry of viewer connections
//! - [`relay`]: cross-process publish/subscribe and the relay→hub bridge

pub mod hub;
pub mod relay;

pub use hub::{Connection, ConnectionId, Frame, Hub, HubConfig, HubHandle};
pub use relay::{start_relay_bridge, EventStream, Relay};
