//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::state::VersionLabel;

/// Halldyll - Versioned deployments for serverless functions.
#[derive(Parser, Debug)]
#[command(name = "halldyll-fn")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "HALLDYLL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Package, upload and publish the application as a new version.
    Deploy,

    /// Make a previously deployed version active again.
    Rollback {
        /// Version to restore, e.g. `v3`.
        #[arg(id = "target_version", value_name = "VERSION")]
        version: VersionLabel,
    },

    /// Delete the deployed stack. Versioned copies stay in the bucket.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the versions recorded for the application.
    History {
        /// Number of entries to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Create a new project.
    New {
        /// Project name, also the directory created.
        name: String,

        /// Region to deploy into.
        #[arg(long, default_value = "us-east-1")]
        region: String,

        /// Bucket for artifacts and the manifest (defaults to `<name>-deploys`).
        #[arg(long)]
        bucket_name: Option<String>,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Write a handler skeleton for a new function.
    Generate {
        /// Function name, may contain `/`.
        function: String,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Show function logs.
    Logs {
        /// Function name (optional, shows all functions if not specified).
        function: Option<String>,

        /// Follow log output.
        #[arg(short, long)]
        follow: bool,

        /// How far back to start, e.g. `30s`, `10m`, `2h`, `1d`.
        #[arg(long, value_parser = parse_since)]
        since: Option<Duration>,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Parses a relative duration such as `10m`.
///
/// A bare number is read as minutes.
///
/// # Errors
///
/// Returns a message naming the accepted units on malformed input.
pub fn parse_since(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let split = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (amount, unit) = value.split_at(split);

    let amount: u64 = amount
        .parse()
        .map_err(|_| format!("invalid duration '{value}'"))?;
    let seconds = match unit {
        "s" => amount,
        "" | "m" => amount * 60,
        "h" => amount * 3600,
        "d" => amount * 86_400,
        _ => return Err(format!("invalid unit in '{value}', use s, m, h or d")),
    };
    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_since() {
        assert_eq!(parse_since("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(parse_since("10m"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_since("10"), Ok(Duration::from_secs(600)));
        assert_eq!(parse_since("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_since("1d"), Ok(Duration::from_secs(86_400)));
        assert!(parse_since("m").is_err());
        assert!(parse_since("5w").is_err());
    }

    #[test]
    fn test_rollback_parses_version_label() {
        let cli = Cli::try_parse_from(["halldyll-fn", "rollback", "v3"]).expect("parse");
        match cli.command {
            Commands::Rollback { version } => assert_eq!(version, VersionLabel::new(3)),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Cli::try_parse_from(["halldyll-fn", "rollback", "three"]).is_err());
    }

    #[test]
    fn test_logs_arguments() {
        let cli = Cli::try_parse_from([
            "halldyll-fn",
            "logs",
            "orders/create",
            "--follow",
            "--since",
            "15m",
            "--output",
            "json",
        ])
        .expect("parse");

        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Logs {
                function,
                follow,
                since,
            } => {
                assert_eq!(function.as_deref(), Some("orders/create"));
                assert!(follow);
                assert_eq!(since, Some(Duration::from_secs(900)));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
