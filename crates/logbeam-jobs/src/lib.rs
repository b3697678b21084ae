//! # logbeam-jobs
//!
//! Notification side of logbeam.
//!
//! This crate provides:
//! - Fixed-window rate limiting for the ingestion API and outbound channels
//! - The notification work queue
//! - Ingestion fan-out (relay publish plus per-channel job enqueue)
//! - Channel senders and the dispatcher that drives them
//!
//! ## Example
//!
//! ```ignore
//! use logbeam_jobs::{DispatcherBuilder, DispatcherConfig, LogSender, WebhookSender};
//!
//! let dispatcher = DispatcherBuilder::new(queue, limiter, directory)
//!     .with_config(DispatcherConfig::from_env())
//!     .with_sender(LogSender)
//!     .with_sender(WebhookSender::new(Duration::from_secs(10))?)
//!     .build();
//!
//! let handle = dispatcher.start(cancel.child_token());
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await;
//! ```

pub mod directory;
pub mod fanout;
pub mod queue;
pub mod ratelimit;
pub mod sender;
pub mod worker;

pub use directory::StaticChannelDirectory;
pub use fanout::{Fanout, FanoutReport};
pub use queue::WorkQueue;
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use sender::{sign_payload, ChannelSender, LogSender, WebhookSender, SIGNATURE_HEADER};
pub use worker::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, DispatcherConfig, DispatcherEvent,
    DispatcherHandle, SkipReason,
};
