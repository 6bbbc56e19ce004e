//! Terminal host for [`scriptunit`].
//!
//! Loads a Lua script, applies `config.toml` and the command line, then runs
//! the script while printing state changes and reading console commands
//! (`continue`, `break`, `abort`, breakpoint edits) from stdin.
mod cli;
mod config;
mod console;

pub use cli::{Cli, init_tracing};
pub use config::{Config, ConfigError, config_dir};
pub use console::Command;
