//! Summary formatting and the publish seam.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::types::{MoodSummary, RankedItem};

/// How much of the top post's text the summary embeds.
const TOP_POST_EXCERPT_CHARS: usize = 120;

/// Identifiers returned by the publishing sink.
#[derive(Debug, Clone)]
pub struct PublishReceipt {
    pub post_id: String,
    pub content_id: String,
}

/// The outward-facing sink for a finished summary.
///
/// The real platform write API lives outside this crate; what ships here is
/// [`LogPublisher`]. Delivery is at-least-once from the pipeline's point of
/// view — implementations should tolerate seeing the same summary twice.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish the formatted text together with the ranked posts it embeds.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::PublishFailed`] when the sink rejects the
    /// post. The run's own status is unaffected by then.
    async fn publish(
        &self,
        text: &str,
        top_items: &[RankedItem],
    ) -> Result<PublishReceipt, PipelineError>;
}

/// Publisher that writes the summary to the log and succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl Publisher for LogPublisher {
    async fn publish(
        &self,
        text: &str,
        top_items: &[RankedItem],
    ) -> Result<PublishReceipt, PipelineError> {
        tracing::info!(top_items = top_items.len(), summary = text, "publishing summary");
        Ok(PublishReceipt {
            post_id: "log".to_owned(),
            content_id: "log".to_owned(),
        })
    }
}

/// Render the one-line network-mood summary.
#[must_use]
pub fn format_summary(summary: &MoodSummary) -> String {
    let mut text = format!(
        "network mood: {} ({:+.1}% net sentiment) — {} posts in the last {} minutes.",
        summary.mood, summary.net_sentiment_percent, summary.item_count, summary.window_minutes
    );

    if let Some(top) = summary.top_items.first() {
        text.push_str(&format!(
            " top post by @{} ({} engagements): \"{}\"",
            top.author_handle,
            top.engagement,
            excerpt(&top.text, TOP_POST_EXCERPT_CHARS)
        ));
    }

    text
}

/// Render the quiet-window message — distinguishable from a zero summary.
#[must_use]
pub fn format_quiet(window_minutes: i64) -> String {
    format!("quiet period — no posts found in the last {window_minutes} minutes.")
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let truncated: String = flattened.chars().take(max_chars).collect();
    format!("{}…", truncated.trim_end())
}
