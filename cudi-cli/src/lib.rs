//! Cudi identity command-line front end
//!
//! This module exposes the command handlers for use in integration tests.

mod cli;
mod commands;
pub mod logging;

pub use cli::{Cli, Command};
pub use commands::{default_backup_name, run, CliResult};
