//! CLI module for the Halldyll function deployment tool.
//!
//! This module provides the command-line interface: argument parsing,
//! output formatting and the project skeletons written by `new` and
//! `generate`.

mod commands;
mod output;
mod scaffold;

pub use commands::{Cli, Commands, OutputFormat, parse_since};
pub use output::OutputFormatter;
pub use scaffold::{
    GeneratedFunction, HANDLER_FILE, STARTER_FUNCTION, create_project, generate_function,
};
