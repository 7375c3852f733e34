//! Log retrieval for deployed functions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;

use super::api::ControlPlane;
use super::types::{LogEvent, LogQuery};

/// Upper bound on pages fetched per call, guarding against a control plane
/// that keeps returning tokens.
const MAX_PAGES: usize = 100;

/// Reads log events through the control plane.
#[derive(Clone)]
pub struct LogReader {
    control: Arc<dyn ControlPlane>,
}

/// Remembers what was already printed while following logs.
#[derive(Debug, Clone, Default)]
pub struct LogCursor {
    last_seen: Option<DateTime<Utc>>,
    seen_at_last: HashSet<(String, String)>,
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader").finish_non_exhaustive()
    }
}

impl LogReader {
    /// Creates a reader.
    #[must_use]
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self { control }
    }

    /// Fetches every event of a log group since `since`, oldest first.
    ///
    /// Streams are listed first; a group without streams yields nothing.
    /// Pages are followed through their continuation tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if a control plane call fails.
    pub async fn fetch(
        &self,
        log_group: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LogEvent>> {
        let streams = self.control.list_log_streams(log_group).await?;
        if streams.is_empty() {
            debug!("No log streams in {log_group}");
            return Ok(Vec::new());
        }

        let mut query = LogQuery {
            log_group: log_group.to_string(),
            streams: streams.into_iter().map(|s| s.name).collect(),
            start_time: since,
            pattern: None,
            next_token: None,
        };

        let mut events = Vec::new();
        for _ in 0..MAX_PAGES {
            let page = self.control.filter_log_events(&query).await?;
            events.extend(page.events);

            match page.next_token {
                Some(token) if query.next_token.as_deref() != Some(token.as_str()) => {
                    query.next_token = Some(token);
                }
                _ => break,
            }
        }

        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        debug!("Fetched {} events from {log_group}", events.len());
        Ok(events)
    }
}

impl LogCursor {
    /// Lower bound for the next query.
    #[must_use]
    pub const fn since(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }

    /// Drops events that were already returned and advances the cursor.
    ///
    /// `events` must be sorted oldest first.
    pub fn advance(&mut self, events: Vec<LogEvent>) -> Vec<LogEvent> {
        let fresh: Vec<LogEvent> = events
            .into_iter()
            .filter(|event| match self.last_seen {
                Some(last) if event.timestamp < last => false,
                Some(last) if event.timestamp == last => !self
                    .seen_at_last
                    .contains(&(event.stream.clone(), event.message.clone())),
                _ => true,
            })
            .collect();

        for event in &fresh {
            if self.last_seen != Some(event.timestamp) {
                self.last_seen = Some(event.timestamp);
                self.seen_at_last.clear();
            }
            self.seen_at_last
                .insert((event.stream.clone(), event.message.clone()));
        }

        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{LogPage, LogStream, MockControlPlane};
    use chrono::TimeZone;

    fn event(secs: i64, message: &str) -> LogEvent {
        LogEvent {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).single().expect("time"),
            stream: String::from("s1"),
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fetch_follows_tokens() {
        let mut control = MockControlPlane::new();
        control.expect_list_log_streams().returning(|_| {
            Ok(vec![LogStream {
                name: String::from("s1"),
                last_event_at: None,
            }])
        });
        control
            .expect_filter_log_events()
            .withf(|q| q.next_token.is_none())
            .times(1)
            .returning(|_| {
                Ok(LogPage {
                    events: vec![event(5, "late")],
                    next_token: Some(String::from("page-2")),
                })
            });
        control
            .expect_filter_log_events()
            .withf(|q| q.next_token.as_deref() == Some("page-2"))
            .times(1)
            .returning(|_| {
                Ok(LogPage {
                    events: vec![event(1, "early")],
                    next_token: None,
                })
            });

        let reader = LogReader::new(Arc::new(control));
        let events = reader.fetch("/functions/shop-users", None).await.expect("fetch");

        let messages: Vec<_> = events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_fetch_without_streams() {
        let mut control = MockControlPlane::new();
        control.expect_list_log_streams().returning(|_| Ok(Vec::new()));

        let reader = LogReader::new(Arc::new(control));
        assert!(reader.fetch("/functions/none", None).await.expect("fetch").is_empty());
    }

    #[test]
    fn test_cursor_skips_seen_events() {
        let mut cursor = LogCursor::default();
        let first = cursor.advance(vec![event(1, "a"), event(2, "b")]);
        assert_eq!(first.len(), 2);
        assert_eq!(cursor.since(), Some(event(2, "b").timestamp));

        let second = cursor.advance(vec![event(2, "b"), event(2, "c"), event(3, "d")]);
        let messages: Vec<_> = second.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["c", "d"]);
    }
}
