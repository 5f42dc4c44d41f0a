//! petwatch library crate.
//!
//! Watches a set of remote identities for live-broadcast starts and new
//! public posts, and forwards deduplicated notification events to a sink.

pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod notification;
pub mod watcher;

pub use error::{Error, Result};
