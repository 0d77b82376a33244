//! tileworker - off-thread vector tile parsing
//!
//! Decodes vector tile features on a pool of worker threads, rescales their
//! coordinates into a fixed internal extent and hands the results back to
//! the caller by correlation id.
//!
//! - [`point`] - the 2D point type used for all geometry
//! - [`geometry`] - coordinate quantization and feature indexing
//! - [`worker`] - the worker pool, its protocol and the source registry
//! - [`config`] - `~/.tileworker/config.ini`
//! - [`logging`] - file and stderr logging

pub mod config;
pub mod geometry;
pub mod logging;
pub mod point;
pub mod worker;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
