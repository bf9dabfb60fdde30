//! Wire types for the `searchPosts` endpoint and their normalized form.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Raw response envelope from `app.bsky.feed.searchPosts`.
#[derive(Debug, Deserialize)]
pub(crate) struct SearchPostsResponse {
    pub posts: Vec<WirePost>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePost {
    pub uri: String,
    pub cid: String,
    pub author: WireAuthor,
    pub record: WireRecord,
    #[serde(rename = "likeCount", default)]
    pub like_count: i32,
    #[serde(rename = "repostCount", default)]
    pub repost_count: i32,
    #[serde(rename = "replyCount", default)]
    pub reply_count: i32,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireAuthor {
    pub handle: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRecord {
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

/// One post, normalized for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPost {
    /// Stable global identifier (AT URI).
    pub uri: String,
    /// Content hash, kept for embed reconstruction downstream.
    pub cid: String,
    pub author_handle: String,
    pub text: String,
    /// Source-reported timestamp. `None` when the record carried a
    /// malformed value — such posts cannot take part in window decisions.
    pub created_at: Option<DateTime<Utc>>,
    pub like_count: i32,
    pub repost_count: i32,
    pub reply_count: i32,
}

impl From<WirePost> for FeedPost {
    fn from(wire: WirePost) -> Self {
        let created_at = wire.record.created_at.as_deref().and_then(parse_timestamp);
        FeedPost {
            uri: wire.uri,
            cid: wire.cid,
            author_handle: wire.author.handle,
            text: wire.record.text,
            created_at,
            like_count: wire.like_count,
            repost_count: wire.repost_count,
            reply_count: wire.reply_count,
        }
    }
}

/// One page of search results, newest first.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub posts: Vec<FeedPost>,
    /// Cursor for the page after this one; `None` when the result set is
    /// exhausted from the API's perspective.
    pub cursor: Option<String>,
}

impl SearchPage {
    /// Whether the upstream claims more results exist past this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.cursor.is_some()
    }

    /// Oldest parseable timestamp in the page. Pages are newest-first, but
    /// this scans the lot rather than trusting upstream ordering.
    #[must_use]
    pub fn oldest_created_at(&self) -> Option<DateTime<Utc>> {
        self.posts.iter().filter_map(|p| p.created_at).min()
    }
}

/// Lenient RFC 3339 parse: posts self-report `createdAt` and clients write
/// whatever they like, so unparseable values become `None` instead of
/// failing the page.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_post_normalizes_into_feed_post() {
        let json = r#"{
            "uri": "at://did:plc:abc/app.bsky.feed.post/3kabc",
            "cid": "bafyreiabc",
            "author": { "did": "did:plc:abc", "handle": "alice.example" },
            "record": { "text": "good morning", "createdAt": "2024-06-01T12:00:00.000Z" },
            "likeCount": 5,
            "repostCount": 2,
            "replyCount": 1
        }"#;
        let wire: WirePost = serde_json::from_str(json).unwrap();
        let post = FeedPost::from(wire);

        assert_eq!(post.uri, "at://did:plc:abc/app.bsky.feed.post/3kabc");
        assert_eq!(post.author_handle, "alice.example");
        assert_eq!(post.like_count, 5);
        let created = post.created_at.expect("timestamp should parse");
        assert_eq!(created.to_rfc3339(), "2024-06-01T12:00:00+00:00");
    }

    #[test]
    fn missing_counts_default_to_zero() {
        let json = r#"{
            "uri": "at://did:plc:abc/app.bsky.feed.post/3kdef",
            "cid": "bafyreidef",
            "author": { "handle": "bob.example" },
            "record": { "text": "quiet post" }
        }"#;
        let wire: WirePost = serde_json::from_str(json).unwrap();
        let post = FeedPost::from(wire);
        assert_eq!(post.like_count, 0);
        assert_eq!(post.repost_count, 0);
        assert_eq!(post.reply_count, 0);
        assert!(post.created_at.is_none());
    }

    #[test]
    fn malformed_timestamp_becomes_none() {
        let json = r#"{
            "uri": "at://did:plc:abc/app.bsky.feed.post/3kghi",
            "cid": "bafyreighi",
            "author": { "handle": "carol.example" },
            "record": { "text": "bad clock", "createdAt": "yesterday-ish" }
        }"#;
        let wire: WirePost = serde_json::from_str(json).unwrap();
        assert!(FeedPost::from(wire).created_at.is_none());
    }

    #[test]
    fn oldest_created_at_skips_unparseable_posts() {
        let page = SearchPage {
            posts: vec![
                FeedPost {
                    uri: "at://a".into(),
                    cid: "c1".into(),
                    author_handle: "a".into(),
                    text: String::new(),
                    created_at: parse_timestamp("2024-06-01T12:00:00Z"),
                    like_count: 0,
                    repost_count: 0,
                    reply_count: 0,
                },
                FeedPost {
                    uri: "at://b".into(),
                    cid: "c2".into(),
                    author_handle: "b".into(),
                    text: String::new(),
                    created_at: None,
                    like_count: 0,
                    repost_count: 0,
                    reply_count: 0,
                },
                FeedPost {
                    uri: "at://c".into(),
                    cid: "c3".into(),
                    author_handle: "c".into(),
                    text: String::new(),
                    created_at: parse_timestamp("2024-06-01T11:00:00Z"),
                    like_count: 0,
                    repost_count: 0,
                    reply_count: 0,
                },
            ],
            cursor: Some("300".to_owned()),
        };
        let oldest = page.oldest_created_at().expect("has timestamps");
        assert_eq!(oldest.to_rfc3339(), "2024-06-01T11:00:00+00:00");
    }

    #[test]
    fn empty_page_has_no_oldest_timestamp() {
        let page = SearchPage {
            posts: vec![],
            cursor: None,
        };
        assert!(page.oldest_created_at().is_none());
        assert!(!page.has_more());
    }
}
