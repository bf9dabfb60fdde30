//! Domain types persisted by the run-state store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis cycle over a fixed time window.
///
/// `cursor` and `has_more` only move forward for the life of the run; the
/// window boundaries never change after creation.
#[derive(Debug, Clone)]
pub struct Run {
    /// Time-ordered public identifier (UUIDv7).
    pub run_id: Uuid,
    pub idempotency_key: Option<String>,
    /// Search term captured at creation so re-dispatched stages stay consistent.
    pub query: String,
    pub status: RunStatus,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Opaque pagination token; empty string means start of result set.
    pub cursor: String,
    pub has_more: bool,
    pub rounds_completed: i32,
    /// Filled in by the aggregation stage.
    pub item_count: Option<i32>,
    pub average_compound: Option<f64>,
    pub mood_label: Option<String>,
    pub top_items: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The whole record (items included) is purged after this instant.
    pub expires_at: DateTime<Utc>,
}

impl Run {
    /// True once collection has stopped, whatever the reason.
    #[must_use]
    pub fn collection_done(&self) -> bool {
        !self.has_more || self.status != RunStatus::Running
    }
}

/// One collected post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Item {
    /// Stable global identifier (the post URI); dedup identity key.
    pub external_id: String,
    /// Content hash used for embed reconstruction.
    pub content_id: String,
    pub author_handle: String,
    pub text: String,
    /// Source-reported creation timestamp.
    pub created_at: DateTime<Utc>,
    pub like_count: i32,
    pub repost_count: i32,
    pub reply_count: i32,
}

impl Item {
    /// Raw engagement: likes + reposts + replies.
    #[must_use]
    pub fn engagement(&self) -> i64 {
        i64::from(self.like_count) + i64::from(self.repost_count) + i64::from(self.reply_count)
    }
}

/// Aggregation-stage output persisted onto the run record.
///
/// A quiet window is a valid aggregate: `item_count == 0` with no sentiment
/// and an empty `top_items` array.
#[derive(Debug, Clone)]
pub struct RunAggregate {
    pub item_count: i32,
    pub average_compound: Option<f64>,
    pub mood_label: Option<String>,
    pub top_items: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("queued"), None);
    }

    #[test]
    fn engagement_sums_all_three_counters() {
        let item = Item {
            external_id: "at://did:plc:abc/app.bsky.feed.post/1".to_string(),
            content_id: "bafyone".to_string(),
            author_handle: "alice.example".to_string(),
            text: "hello".to_string(),
            created_at: Utc::now(),
            like_count: 3,
            repost_count: 2,
            reply_count: 1,
        };
        assert_eq!(item.engagement(), 6);
    }

    #[test]
    fn engagement_does_not_overflow_i32_sums() {
        let item = Item {
            external_id: "at://did:plc:abc/app.bsky.feed.post/2".to_string(),
            content_id: "bafytwo".to_string(),
            author_handle: "bob.example".to_string(),
            text: "popular".to_string(),
            created_at: Utc::now(),
            like_count: i32::MAX,
            repost_count: i32::MAX,
            reply_count: i32::MAX,
        };
        assert_eq!(item.engagement(), 3 * i64::from(i32::MAX));
    }
}
