//! Clipforge - media merging and trimming over HTTP
//!
//! This library crate exposes the server and configuration for integration
//! testing.

pub mod config;
pub mod server;
