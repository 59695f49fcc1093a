//! Pilot - tool-using agent loop for the Anthropic Messages API
//!
//! This library provides the conversation core: a pruned, write-through
//! history, a sanitizer that keeps tool blocks paired, bounded retries and
//! sequential tool dispatch.

pub mod agent;
pub mod tools;
pub mod adapters;
pub mod config;
pub mod error;
pub mod session;
pub mod ui;

pub use error::{Error, Result};
