//! Trigger declarations.
//!
//! Each trigger kind is a closed variant of [`TriggerSpec`]. Required fields
//! deserialize to empty values when absent so that [`TriggerSpec::validate`]
//! can name the missing field instead of surfacing a generic parse error.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Event source invoking a function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    /// Periodic invocation.
    Schedule(ScheduleTrigger),
    /// Object-store bucket notifications.
    ObjectStore(ObjectStoreTrigger),
    /// Pub/sub topic subscription.
    Topic(TopicTrigger),
    /// Stream consumer.
    Stream(StreamTrigger),
    /// Log subscription filter.
    LogFilter(LogFilterTrigger),
}

/// Periodic invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleTrigger {
    /// `rate(...)` or `cron(...)` expression.
    #[serde(default)]
    pub expression: String,
    /// Whether the rule is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Constant JSON input passed to the function.
    #[serde(default)]
    pub input: Option<String>,
}

/// Object-store bucket notifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectStoreTrigger {
    /// Source bucket.
    #[serde(default)]
    pub bucket: String,
    /// Event names, e.g. `object:created`.
    #[serde(default)]
    pub events: Vec<String>,
    /// Optional key prefix filter.
    #[serde(default)]
    pub prefix: Option<String>,
    /// Optional key suffix filter.
    #[serde(default)]
    pub suffix: Option<String>,
}

/// Pub/sub topic subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopicTrigger {
    /// Topic name or identifier.
    #[serde(default)]
    pub topic: String,
}

/// Stream consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamTrigger {
    /// Stream identifier.
    #[serde(default)]
    pub stream: String,
    /// `LATEST` or `TRIM_HORIZON`.
    #[serde(default)]
    pub starting_position: String,
    /// Records per invocation.
    #[serde(default)]
    pub batch_size: Option<u32>,
}

/// Log subscription filter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogFilterTrigger {
    /// Log group to subscribe to.
    #[serde(default)]
    pub log_group: String,
    /// Filter pattern, empty matches everything.
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Accepted stream starting positions.
const STARTING_POSITIONS: &[&str] = &["LATEST", "TRIM_HORIZON"];

/// Largest accepted stream batch size.
const MAX_BATCH_SIZE: u32 = 10_000;

const fn default_enabled() -> bool {
    true
}

impl TriggerSpec {
    /// Short kind name used in messages and logical ids.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Schedule(_) => "schedule",
            Self::ObjectStore(_) => "object_store",
            Self::Topic(_) => "topic",
            Self::Stream(_) => "stream",
            Self::LogFilter(_) => "log_filter",
        }
    }

    /// Checks that every required field of the trigger is present and well
    /// formed.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the first offending field.
    pub fn validate(&self, function: &str) -> Result<(), ConfigError> {
        let missing = |field: &str| ConfigError::MissingTriggerField {
            function: function.to_string(),
            trigger: self.kind().to_string(),
            field: field.to_string(),
        };

        match self {
            Self::Schedule(schedule) => {
                if schedule.expression.trim().is_empty() {
                    return Err(missing("expression"));
                }
                let expr = schedule.expression.trim();
                if !(expr.starts_with("rate(") || expr.starts_with("cron(")) || !expr.ends_with(')')
                {
                    return Err(ConfigError::validation(
                        format!("Schedule expression '{expr}' must be rate(...) or cron(...)"),
                        format!("functions.{function}.triggers.expression"),
                    ));
                }
                if let Some(input) = &schedule.input {
                    serde_json::from_str::<serde_json::Value>(input).map_err(|e| {
                        ConfigError::validation(
                            format!("Schedule input is not valid JSON: {e}"),
                            format!("functions.{function}.triggers.input"),
                        )
                    })?;
                }
            }
            Self::ObjectStore(store) => {
                if store.bucket.trim().is_empty() {
                    return Err(missing("bucket"));
                }
                if store.events.is_empty() {
                    return Err(missing("events"));
                }
            }
            Self::Topic(topic) => {
                if topic.topic.trim().is_empty() {
                    return Err(missing("topic"));
                }
            }
            Self::Stream(stream) => {
                if stream.stream.trim().is_empty() {
                    return Err(missing("stream"));
                }
                if stream.starting_position.trim().is_empty() {
                    return Err(missing("starting_position"));
                }
                if !STARTING_POSITIONS.contains(&stream.starting_position.as_str()) {
                    return Err(ConfigError::validation(
                        format!(
                            "Starting position '{}' must be one of {}",
                            stream.starting_position,
                            STARTING_POSITIONS.join(", ")
                        ),
                        format!("functions.{function}.triggers.starting_position"),
                    ));
                }
                if let Some(size) = stream.batch_size
                    && !(1..=MAX_BATCH_SIZE).contains(&size)
                {
                    return Err(ConfigError::validation(
                        format!("Batch size {size} must be between 1 and {MAX_BATCH_SIZE}"),
                        format!("functions.{function}.triggers.batch_size"),
                    ));
                }
            }
            Self::LogFilter(filter) => {
                if filter.log_group.trim().is_empty() {
                    return Err(missing("log_group"));
                }
            }
        }

        Ok(())
    }
}
