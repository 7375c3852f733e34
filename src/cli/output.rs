//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use serde_json::json;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::error::HalldyllError;
use crate::pipeline::{DeployOutcome, DeployedFunction, InterruptOutcome, RollbackOutcome};
use crate::remote::LogEvent;
use crate::state::{Manifest, Operation, VersionLabel};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Function row for table display.
#[derive(Tabled)]
struct FunctionRow {
    #[tabled(rename = "Function")]
    name: String,
    #[tabled(rename = "Deployed as")]
    deployed_name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Artifact")]
    key: String,
}

/// History row for table display.
#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "When")]
    timestamp: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true when machine-readable output was requested.
    #[must_use]
    pub const fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Formats the result of a deploy.
    #[must_use]
    pub fn format_deploy(&self, outcome: &DeployOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => Self::format_deploy_text(outcome),
        }
    }

    fn format_deploy_text(outcome: &DeployOutcome) -> String {
        match outcome {
            DeployOutcome::NoChanges { version } => format!(
                "{} No changes - {} is already deployed.\n",
                "✓".green(),
                version.to_string().bold()
            ),
            DeployOutcome::Deployed {
                version,
                previous_version,
                base_url,
                functions,
            } => {
                let mut output = String::new();

                let _ = writeln!(
                    output,
                    "\n{} Deployed {}{}\n",
                    "✓".green(),
                    version.to_string().bold(),
                    previous_version.map_or_else(String::new, |p| format!(" (was {p})"))
                );

                if !functions.is_empty() {
                    let rows: Vec<FunctionRow> = functions.iter().map(FunctionRow::from).collect();
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                if let Some(url) = base_url {
                    let _ = write!(output, "\nEndpoint: {}\n", url.cyan());
                }

                output
            }
        }
    }

    /// Formats how an interrupted deploy ended.
    #[must_use]
    pub fn format_interrupt(&self, outcome: &InterruptOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                let version = match outcome {
                    InterruptOutcome::RolledBack { version } => Some(version.to_string()),
                    InterruptOutcome::CompletedFirstVersion { version } => {
                        version.map(|v| v.to_string())
                    }
                    InterruptOutcome::Terminated { .. } | InterruptOutcome::Cancelled => None,
                };
                let value = json!({
                    "result": "interrupted",
                    "outcome": outcome.to_string(),
                    "version": version,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} Deployment interrupted: {outcome}\n", "⚠".yellow()),
        }
    }

    /// Formats a deploy stopped by a failed smoke test.
    ///
    /// The stack already carries the new template at that point but the
    /// stage was not published, so the text names the command restoring
    /// `previous`.
    #[must_use]
    pub fn format_verification_failure(
        &self,
        error: &HalldyllError,
        previous: Option<VersionLabel>,
    ) -> String {
        let rollback = previous.map(|v| format!("halldyll-fn rollback {v}"));

        match self.format {
            OutputFormat::Json => {
                let value = json!({
                    "result": "verification_failed",
                    "error": error.to_string(),
                    "previous_version": previous,
                    "rollback": rollback,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} {error}\n", "✗".red());
                output.push_str("  The new template is applied to the stack but was not published.\n");
                match (previous, rollback) {
                    (Some(version), Some(command)) => {
                        let _ = writeln!(output, "  Restore {version} with: {}", command.bold());
                    }
                    _ => output.push_str("  No earlier version exists; fix the handlers and deploy again.\n"),
                }
                output
            }
        }
    }

    /// Formats the result of a rollback.
    #[must_use]
    pub fn format_rollback(&self, outcome: &RollbackOutcome) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(outcome).unwrap_or_default(),
            OutputFormat::Text => {
                let from = outcome
                    .previous_version
                    .map_or_else(|| String::from("nothing"), |v| v.to_string());
                let detail = if outcome.changed {
                    ""
                } else {
                    " (stack already matched)"
                };
                format!(
                    "{} Rolled back from {from} to {}{detail}\n",
                    "✓".green(),
                    outcome.version.to_string().bold()
                )
            }
        }
    }

    /// Formats the most recent `limit` history entries of a manifest.
    #[must_use]
    pub fn format_history(&self, manifest: &Manifest, limit: usize) -> String {
        let skip = manifest.history.len().saturating_sub(limit);
        let entries = &manifest.history[skip..];

        match self.format {
            OutputFormat::Json => {
                let value = json!({
                    "identifier": manifest.identifier,
                    "active_version": manifest.active_version,
                    "base_url": manifest.base_url,
                    "history": entries,
                });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();

                let _ = write!(output, "\n📦 Application: {}\n\n", manifest.identifier);
                let _ = writeln!(
                    output,
                    "   Active version: {}",
                    manifest
                        .active_version
                        .map_or_else(|| "none".dimmed().to_string(), |v| v.to_string().bold().to_string())
                );
                if let Some(url) = &manifest.base_url {
                    let _ = writeln!(output, "   Endpoint: {url}");
                }
                let _ = writeln!(output, "   Versions recorded: {}", manifest.version_hashes.len());

                if entries.is_empty() {
                    output.push_str("\n   No history.\n");
                    return output;
                }

                let rows: Vec<HistoryRow> = entries
                    .iter()
                    .rev()
                    .map(|entry| HistoryRow {
                        version: entry.version.to_string(),
                        operation: Self::format_operation(entry.operation),
                        hash: Self::truncate(&entry.hash, 12),
                        timestamp: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    })
                    .collect();

                output.push('\n');
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats one log line of `function`.
    #[must_use]
    pub fn format_log_event(&self, function: &str, event: &LogEvent) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({
                    "function": function,
                    "timestamp": event.timestamp,
                    "stream": event.stream,
                    "message": event.message.trim_end(),
                });
                value.to_string()
            }
            OutputFormat::Text => format!(
                "{} {} {}",
                event.timestamp.format("%Y-%m-%d %H:%M:%S%.3f").to_string().dimmed(),
                function.cyan(),
                event.message.trim_end()
            ),
        }
    }

    /// Formats a success message.
    #[must_use]
    pub fn success(&self, message: &str) -> String {
        self.message("success", &"✓".green().to_string(), message)
    }

    /// Formats an error message.
    #[must_use]
    pub fn error(&self, message: &str) -> String {
        self.message("error", &"✗".red().to_string(), message)
    }

    /// Formats a warning message.
    #[must_use]
    pub fn warning(&self, message: &str) -> String {
        self.message("warning", &"⚠".yellow().to_string(), message)
    }

    fn message(&self, status: &str, symbol: &str, message: &str) -> String {
        match self.format {
            OutputFormat::Json => {
                let value = json!({ "status": status, "message": message });
                serde_json::to_string_pretty(&value).unwrap_or_default()
            }
            OutputFormat::Text => format!("{symbol} {message}"),
        }
    }

    /// Formats an operation with color.
    fn format_operation(operation: Operation) -> String {
        match operation {
            Operation::Deploy => "deploy".green().to_string(),
            Operation::Rollback => "rollback".yellow().to_string(),
        }
    }

    /// Formats a byte count.
    fn format_size(bytes: u64) -> String {
        const KIB: u64 = 1024;
        const MIB: u64 = KIB * 1024;

        if bytes >= MIB {
            format!("{}.{} MiB", bytes / MIB, (bytes % MIB) * 10 / MIB)
        } else if bytes >= KIB {
            format!("{}.{} KiB", bytes / KIB, (bytes % KIB) * 10 / KIB)
        } else {
            format!("{bytes} B")
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

impl From<&DeployedFunction> for FunctionRow {
    fn from(function: &DeployedFunction) -> Self {
        Self {
            name: function.name.clone(),
            deployed_name: function.deployed_name.clone(),
            size: OutputFormatter::format_size(function.size_bytes),
            key: function.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VerificationError;
    use crate::pipeline::PipelineState;
    use chrono::{TimeZone, Utc};

    fn plain() -> OutputFormatter {
        colored::control::set_override(false);
        OutputFormatter::new(OutputFormat::Text)
    }

    fn deployed() -> DeployOutcome {
        DeployOutcome::Deployed {
            version: VersionLabel::new(4),
            previous_version: Some(VersionLabel::new(3)),
            base_url: Some(String::from("https://abc.eu-west-1.example.com/prod")),
            functions: vec![DeployedFunction {
                name: String::from("orders/create"),
                deployed_name: String::from("shop-orders-create"),
                key: String::from("v4/orders/create-0123abcd.zip"),
                size_bytes: 2048,
            }],
        }
    }

    #[test]
    fn test_deploy_text_lists_functions_and_endpoint() {
        let output = plain().format_deploy(&deployed());
        assert!(output.contains("Deployed v4 (was v3)"));
        assert!(output.contains("shop-orders-create"));
        assert!(output.contains("2.0 KiB"));
        assert!(output.contains("Endpoint: https://abc.eu-west-1.example.com/prod"));
    }

    #[test]
    fn test_deploy_json_is_tagged() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value =
            serde_json::from_str(&formatter.format_deploy(&deployed())).expect("json");
        assert_eq!(value["result"], "deployed");
        assert_eq!(value["version"], "v4");
        assert_eq!(value["functions"][0]["size_bytes"], 2048);
    }

    #[test]
    fn test_no_changes_text() {
        let output = plain().format_deploy(&DeployOutcome::NoChanges {
            version: VersionLabel::new(2),
        });
        assert!(output.contains("v2 is already deployed"));
    }

    #[test]
    fn test_interrupt_json_carries_version() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&formatter.format_interrupt(
            &InterruptOutcome::RolledBack {
                version: VersionLabel::new(2),
            },
        ))
        .expect("json");
        assert_eq!(value["result"], "interrupted");
        assert_eq!(value["version"], "v2");

        let text = plain().format_interrupt(&InterruptOutcome::Terminated {
            state: PipelineState::Compressing,
        });
        assert!(text.contains("terminated during COMPRESSING"));
    }

    fn smoke_failure() -> HalldyllError {
        VerificationError::SmokeTestFailed {
            function: String::from("shop-users"),
            status: 200,
            payload: String::from(r#"{"test":"broken"}"#),
        }
        .into()
    }

    #[test]
    fn test_verification_failure_names_rollback_command() {
        let text = plain().format_verification_failure(&smoke_failure(), Some(VersionLabel::new(3)));
        assert!(text.contains("Smoke test failed for 'shop-users'"));
        assert!(text.contains("applied to the stack but was not published"));
        assert!(text.contains("halldyll-fn rollback v3"));

        let first = plain().format_verification_failure(&smoke_failure(), None);
        assert!(!first.contains("halldyll-fn rollback"));
        assert!(first.contains("No earlier version exists"));

        let formatter = OutputFormatter::new(OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(
            &formatter.format_verification_failure(&smoke_failure(), Some(VersionLabel::new(3))),
        )
        .expect("json");
        assert_eq!(value["result"], "verification_failed");
        assert_eq!(value["previous_version"], "v3");
        assert_eq!(value["rollback"], "halldyll-fn rollback v3");
    }

    #[test]
    fn test_history_shows_latest_entries_first() {
        let mut manifest = Manifest::new("shop");
        for n in 1..=3 {
            let version = VersionLabel::new(n);
            manifest
                .record_version(version, &format!("hash-{n}"))
                .expect("record");
            manifest.activate(version, Operation::Deploy).expect("activate");
        }
        manifest
            .activate(VersionLabel::FIRST, Operation::Rollback)
            .expect("activate");

        let output = plain().format_history(&manifest, 2);
        assert!(output.contains("Active version: v1"));
        assert!(output.contains("Versions recorded: 3"));
        let rollback = output.find("rollback").expect("rollback row");
        let deploy = output.find("hash-3").expect("deploy row");
        assert!(rollback < deploy);
        assert!(!output.contains("hash-2"));
    }

    #[test]
    fn test_log_event_formats() {
        let event = LogEvent {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).single().expect("time"),
            stream: String::from("s1"),
            message: String::from("started\n"),
        };

        let text = plain().format_log_event("orders", &event);
        assert!(text.ends_with("orders started"));

        let json = OutputFormatter::new(OutputFormat::Json).format_log_event("orders", &event);
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        assert_eq!(value["message"], "started");
        assert_eq!(value["function"], "orders");
    }

    #[test]
    fn test_truncate_and_size() {
        assert_eq!(OutputFormatter::truncate("abcdef", 10), "abcdef");
        assert_eq!(OutputFormatter::truncate("abcdefghijkl", 8), "abcde...");
        assert_eq!(OutputFormatter::format_size(512), "512 B");
        assert_eq!(OutputFormatter::format_size(3 * 1024 * 1024), "3.0 MiB");
    }
}
