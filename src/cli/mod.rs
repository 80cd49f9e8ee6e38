//! Command-line interface for noteforge.
//!
//! Provides the `serve` and `worker` commands that make up a running
//! deployment.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
