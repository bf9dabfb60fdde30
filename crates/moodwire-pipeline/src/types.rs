//! Pipeline configuration and aggregation output types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Three-way bucket derived from a compound score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentCategory {
    Positive,
    Neutral,
    Negative,
}

impl SentimentCategory {
    /// `>= +0.3` is positive, `<= -0.3` is negative, the rest neutral.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.3 {
            SentimentCategory::Positive
        } else if score <= -0.3 {
            SentimentCategory::Negative
        } else {
            SentimentCategory::Neutral
        }
    }
}

/// One of the top-N posts, as persisted onto the run record and embedded in
/// the published summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedItem {
    /// 1-based position in the engagement ranking.
    pub rank: usize,
    pub external_id: String,
    pub content_id: String,
    pub author_handle: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub like_count: i32,
    pub repost_count: i32,
    pub reply_count: i32,
    pub engagement: i64,
    pub sentiment_score: f32,
    pub sentiment_category: SentimentCategory,
}

/// Aggregation result for a non-empty window.
#[derive(Debug, Clone)]
pub struct MoodSummary {
    /// Items surviving dedup and the window filter — the population the
    /// average is computed over.
    pub item_count: usize,
    pub average_compound: f64,
    pub net_sentiment_percent: f64,
    pub category: SentimentCategory,
    pub mood: &'static str,
    pub window_minutes: i64,
    pub top_items: Vec<RankedItem>,
}

/// What the aggregation stage produced: a quiet window is a normal outcome,
/// not an error.
#[derive(Debug, Clone)]
pub enum AggregateOutcome {
    Quiet,
    Summary(MoodSummary),
}

/// Why collection stopped. First condition to trigger wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The oldest item of a round precedes the window start.
    BoundaryCrossed,
    /// The configured round-count safety valve fired.
    RoundLimitReached,
    /// A round or the whole collection stage ran out of wall-clock budget.
    BudgetElapsed,
    /// A round came back with zero items from every worker.
    ResultSetExhausted,
    /// The run had already finished collecting when we looked.
    AlreadyComplete,
}

/// Collector tuning. All of it is configuration: the defaults are safety
/// valves against upstream pagination behavior, not invariants.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub page_size: u32,
    /// K parallel fetch workers per round.
    pub fan_out: u32,
    pub max_rounds: u32,
    /// Wall-clock budget for one round's join barrier.
    pub round_timeout: Duration,
    /// Wall-clock budget for the whole collection stage.
    pub collect_budget: Duration,
    /// Pause before the single retry of a round whose workers all failed.
    pub round_retry_backoff: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            fan_out: 4,
            max_rounds: 25,
            round_timeout: Duration::from_secs(20),
            collect_budget: Duration::from_secs(120),
            round_retry_backoff: Duration::from_secs(1),
        }
    }
}

impl CollectorConfig {
    #[must_use]
    pub fn from_app_config(config: &moodwire_core::AppConfig) -> Self {
        Self {
            page_size: config.page_size,
            fan_out: config.fan_out,
            max_rounds: config.max_rounds,
            round_timeout: Duration::from_secs(config.round_timeout_secs),
            collect_budget: Duration::from_secs(config.collect_budget_secs),
            round_retry_backoff: Duration::from_secs(1),
        }
    }
}

/// Everything one pipeline cycle needs, read once per run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub window_minutes: i64,
    pub query: String,
    pub top_n: usize,
    pub dry_run: bool,
    pub collector: CollectorConfig,
}

impl PipelineConfig {
    #[must_use]
    pub fn from_app_config(config: &moodwire_core::AppConfig) -> Self {
        Self {
            window_minutes: config.window_minutes,
            query: config.search_query.clone(),
            top_n: config.top_n,
            dry_run: config.dry_run,
            collector: CollectorConfig::from_app_config(config),
        }
    }
}
