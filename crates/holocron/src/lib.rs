//! Holocron library services
//!
//! Catalog, user and lending services over an append-only event log. State
//! is never stored; it is folded from the events on every read.
//!
//! - [`domain`] - folds and the lending state machine
//! - [`catalog`] - read-side queries over the event streams
//! - [`bookinfo`] - bibliographic lookup by item code
//! - [`commands`] - validated write operations

pub mod bookinfo;
pub mod catalog;
pub mod cli;
pub mod commands;
pub mod config;
pub mod domain;
pub mod tracing_setup;

#[cfg(test)]
pub mod test_utils;

use anyhow::Result;
use std::process::ExitCode;

/// Main entry point for the holocron binary.
pub async fn run() -> Result<ExitCode> {
    if let Err(e) = tracing_setup::init() {
        eprintln!("Failed to initialize tracing: {}", e);
    }
    cli::run().await
}
