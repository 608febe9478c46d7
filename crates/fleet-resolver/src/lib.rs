//! Fleet resolver service
//!
//! Wires the resolution engine to snapshot-backed vendor sources and serves
//! it over HTTP alongside health and metrics endpoints.

pub mod api;
pub mod config;
pub mod sources;
