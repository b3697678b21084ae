//! HTTP handlers for logbeam-api.

pub mod ingest;
pub mod stats;
pub mod ws;
