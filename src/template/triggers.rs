//! Template resources for function triggers.

use serde_json::{Value, json};

use crate::config::TriggerSpec;

use super::document::{Resource, attribute, kinds, reference};

/// Batch size used when a stream trigger sets none.
const DEFAULT_BATCH_SIZE: u32 = 100;

impl TriggerSpec {
    /// Resources wiring this trigger to a function, keyed by logical id.
    ///
    /// `function_id` is the function's logical id and `index` the trigger's
    /// position in the function's list, which keeps ids unique.
    #[must_use]
    pub fn emit(&self, function_id: &str, index: usize) -> Vec<(String, Resource)> {
        match self {
            Self::Schedule(schedule) => {
                let id = format!("{function_id}Schedule{index}");
                let mut target = json!({
                    "Id": function_id,
                    "Arn": attribute(function_id, "Arn"),
                });
                if let Some(input) = &schedule.input {
                    target["Input"] = Value::String(input.clone());
                }

                let rule = Resource::new(kinds::SCHEDULE_RULE)
                    .with("ScheduleExpression", schedule.expression.trim())
                    .with(
                        "State",
                        if schedule.enabled { "ENABLED" } else { "DISABLED" },
                    )
                    .with("Targets", json!([target]));

                vec![
                    permission(&id, function_id, "events", attribute(&id, "Arn")),
                    (id, rule),
                ]
            }
            Self::ObjectStore(store) => {
                let id = format!("{function_id}ObjectStore{index}");
                let mut filter = serde_json::Map::new();
                if let Some(prefix) = &store.prefix {
                    filter.insert(String::from("Prefix"), json!(prefix));
                }
                if let Some(suffix) = &store.suffix {
                    filter.insert(String::from("Suffix"), json!(suffix));
                }

                let (grant_id, grant) =
                    permission(&id, function_id, "storage", json!(store.bucket));
                let notification = Resource::new(kinds::BUCKET_NOTIFICATION)
                    .with("Bucket", store.bucket.as_str())
                    .with("Events", json!(store.events))
                    .with("Filter", Value::Object(filter))
                    .with("Destination", attribute(function_id, "Arn"))
                    .depends_on(grant_id.clone());

                vec![(grant_id, grant), (id, notification)]
            }
            Self::Topic(topic) => {
                let id = format!("{function_id}Topic{index}");
                let subscription = Resource::new(kinds::TOPIC_SUBSCRIPTION)
                    .with("Topic", topic.topic.as_str())
                    .with("Protocol", "function")
                    .with("Endpoint", attribute(function_id, "Arn"));

                vec![
                    permission(&id, function_id, "messaging", json!(topic.topic)),
                    (id, subscription),
                ]
            }
            Self::Stream(stream) => {
                let id = format!("{function_id}Stream{index}");
                let mapping = Resource::new(kinds::EVENT_SOURCE_MAPPING)
                    .with("EventSource", stream.stream.as_str())
                    .with("FunctionName", reference(function_id))
                    .with("StartingPosition", stream.starting_position.as_str())
                    .with(
                        "BatchSize",
                        stream.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
                    );

                vec![(id, mapping)]
            }
            Self::LogFilter(filter) => {
                let id = format!("{function_id}LogFilter{index}");
                let (grant_id, grant) =
                    permission(&id, function_id, "logs", json!(filter.log_group));
                let subscription = Resource::new(kinds::LOG_SUBSCRIPTION)
                    .with("LogGroupName", filter.log_group.as_str())
                    .with("FilterPattern", filter.pattern.clone().unwrap_or_default())
                    .with("DestinationArn", attribute(function_id, "Arn"))
                    .depends_on(grant_id.clone());

                vec![(grant_id, grant), (id, subscription)]
            }
        }
    }

    /// Source the execution role must be able to read from, if any.
    #[must_use]
    pub fn readable_source(&self) -> Option<&str> {
        match self {
            Self::Stream(stream) => Some(stream.stream.as_str()),
            Self::Schedule(_) | Self::ObjectStore(_) | Self::Topic(_) | Self::LogFilter(_) => {
                None
            }
        }
    }
}

/// Permission letting `principal` invoke the function.
fn permission(
    trigger_id: &str,
    function_id: &str,
    principal: &str,
    source: Value,
) -> (String, Resource) {
    (
        format!("{trigger_id}Permission"),
        Resource::new(kinds::PERMISSION)
            .with("FunctionName", reference(function_id))
            .with("Action", "invoke")
            .with("Principal", principal)
            .with("Source", source),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(yaml: &str) -> TriggerSpec {
        serde_yaml::from_str(yaml).expect("trigger")
    }

    #[test]
    fn test_schedule_emits_rule_and_permission() {
        let resources = trigger(
            "type: schedule\nexpression: rate(1 hour)\nenabled: false\ninput: '{\"a\":1}'\n",
        )
        .emit("CleanupFunction", 0);

        let ids: Vec<_> = resources.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["CleanupFunctionSchedule0Permission", "CleanupFunctionSchedule0"]
        );

        let rule = &resources[1].1;
        assert_eq!(rule.kind, kinds::SCHEDULE_RULE);
        assert_eq!(rule.property_str("State"), Some("DISABLED"));
        assert_eq!(rule.properties["Targets"][0]["Input"], "{\"a\":1}");
        assert_eq!(resources[0].1.property_str("Principal"), Some("events"));
    }

    #[test]
    fn test_object_store_depends_on_permission() {
        let resources = trigger(
            "type: object_store\nbucket: uploads\nevents: ['object:created']\nsuffix: .png\n",
        )
        .emit("ThumbsFunction", 1);

        let (id, notification) = &resources[1];
        assert_eq!(id, "ThumbsFunctionObjectStore1");
        assert_eq!(
            notification.depends_on,
            vec![String::from("ThumbsFunctionObjectStore1Permission")]
        );
        assert_eq!(notification.properties["Filter"]["Suffix"], ".png");
    }

    #[test]
    fn test_stream_needs_no_permission() {
        let spec = trigger("type: stream\nstream: orders\nstarting_position: LATEST\n");
        let resources = spec.emit("OrdersFunction", 0);

        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].1.properties["BatchSize"], 100);
        assert_eq!(spec.readable_source(), Some("orders"));
    }

    #[test]
    fn test_topic_and_log_filter() {
        let topic = trigger("type: topic\ntopic: signups\n").emit("NotifyFunction", 0);
        assert_eq!(topic[1].1.kind, kinds::TOPIC_SUBSCRIPTION);
        assert_eq!(topic[0].1.property_str("Source"), Some("signups"));

        let filter = trigger("type: log_filter\nlog_group: /app/errors\n").emit("AlertFunction", 2);
        assert_eq!(filter[1].0, "AlertFunctionLogFilter2");
        assert_eq!(filter[1].1.property_str("FilterPattern"), Some(""));
    }
}
