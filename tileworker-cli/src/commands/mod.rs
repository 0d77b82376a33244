//! CLI command handlers.

pub mod config;
pub mod quantize;
pub mod resolve;
