//! CLI module for chronosync
//!
//! Provides command-line interface for:
//! - run: boot and poll until ctrl-c
//! - once: drain the backlog once, optionally as a dry run
//! - check: validate config, formulas, source health and schema
//! - status: show the committed watermark
//! - refresh: resend one slice of already synced records

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check, once, refresh, run, run_command, run_loop, status};
pub use errors::{CliError, CliErrorCode, CliResult};
