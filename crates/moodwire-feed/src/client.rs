//! HTTP client for the public AppView search endpoint.
//!
//! Wraps `reqwest` with typed deserialization and error mapping. The
//! endpoint is unauthenticated; there is no token plumbing here.

use std::time::Duration;

use reqwest::{Client, StatusCode, Url};

use crate::error::FeedError;
use crate::types::{SearchPage, SearchPostsResponse};

const DEFAULT_BASE_URL: &str = "https://api.bsky.app";
const SEARCH_PATH: &str = "xrpc/app.bsky.feed.searchPosts";

/// Client for `app.bsky.feed.searchPosts`.
///
/// Use [`SearchClient::new`] for production or
/// [`SearchClient::with_base_url`] to point at a mock server in tests.
#[derive(Debug, Clone)]
pub struct SearchClient {
    client: Client,
    base_url: Url,
}

impl SearchClient {
    /// Creates a client pointed at the production AppView host.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64) -> Result<Self, FeedError> {
        Self::with_base_url(timeout_secs, DEFAULT_BASE_URL)
    }

    /// Creates a client with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`FeedError::InvalidBaseUrl`] if `base_url`
    /// does not parse.
    pub fn with_base_url(timeout_secs: u64, base_url: &str) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("moodwire/0.1 (network-mood)")
            .build()?;

        // Normalise: exactly one trailing slash so path joins land on the root.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalised).map_err(|_| FeedError::InvalidBaseUrl(base_url.to_owned()))?;

        Ok(Self { client, base_url })
    }

    /// Fetches one page of search results, newest first.
    ///
    /// `cursor = None` requests the first page. The upstream caps `limit`
    /// at 100; larger values are clamped server-side.
    ///
    /// # Errors
    ///
    /// - [`FeedError::CursorRejected`] when the upstream refuses the request
    ///   (HTTP 400) — its pagination-depth ceiling in practice.
    /// - [`FeedError::Api`] on any other non-2xx status.
    /// - [`FeedError::Http`] on network failure.
    /// - [`FeedError::Deserialize`] when the body does not match the lexicon.
    pub async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<SearchPage, FeedError> {
        let url = self
            .base_url
            .join(SEARCH_PATH)
            .map_err(|_| FeedError::InvalidBaseUrl(self.base_url.to_string()))?;

        let limit = limit.to_string();
        let mut params: Vec<(&str, &str)> =
            vec![("q", query), ("limit", &limit), ("sort", "latest")];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            params.push(("cursor", cursor));
        }

        let response = self.client.get(url).query(&params).send().await?;
        let status = response.status();

        if status == StatusCode::BAD_REQUEST {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::CursorRejected(truncate(&message, 200)));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                message: truncate(&message, 200),
            });
        }

        let body = response.text().await?;
        let parsed: SearchPostsResponse =
            serde_json::from_str(&body).map_err(|e| FeedError::Deserialize {
                context: format!("searchPosts(q={query})"),
                source: e,
            })?;

        tracing::debug!(
            query,
            cursor = cursor.unwrap_or(""),
            posts = parsed.posts.len(),
            next_cursor = parsed.cursor.as_deref().unwrap_or(""),
            "search page fetched"
        );

        Ok(SearchPage {
            posts: parsed.posts.into_iter().map(Into::into).collect(),
            cursor: parsed.cursor,
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    let trimmed = s.trim();
    if trimmed.len() <= max {
        trimmed.to_owned()
    } else {
        let mut end = max;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &trimmed[..end])
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn posts_body(count: usize, cursor: Option<&str>) -> serde_json::Value {
        let posts: Vec<serde_json::Value> = (0..count)
            .map(|i| {
                serde_json::json!({
                    "uri": format!("at://did:plc:test/app.bsky.feed.post/{i}"),
                    "cid": format!("bafyrei{i}"),
                    "author": { "handle": format!("user{i}.example") },
                    "record": {
                        "text": format!("post number {i}"),
                        "createdAt": "2024-06-01T12:00:00.000Z"
                    },
                    "likeCount": i,
                    "repostCount": 0,
                    "replyCount": 0
                })
            })
            .collect();
        match cursor {
            Some(c) => serde_json::json!({ "posts": posts, "cursor": c }),
            None => serde_json::json!({ "posts": posts }),
        }
    }

    #[tokio::test]
    async fn first_page_request_carries_no_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .and(query_param("q", "the"))
            .and(query_param("limit", "100"))
            .and(query_param("sort", "latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts_body(2, Some("100"))))
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let page = client.search("the", None, 100).await.unwrap();

        assert_eq!(page.posts.len(), 2);
        assert_eq!(page.cursor.as_deref(), Some("100"));
        assert!(page.has_more());
        assert_eq!(page.posts[0].author_handle, "user0.example");
    }

    #[tokio::test]
    async fn cursor_param_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .and(query_param("cursor", "400"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts_body(1, None)))
            .expect(1)
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let page = client.search("the", Some("400"), 100).await.unwrap();

        assert_eq!(page.posts.len(), 1);
        assert!(!page.has_more(), "missing cursor means exhausted");
    }

    #[tokio::test]
    async fn empty_cursor_is_treated_as_first_page() {
        let server = MockServer::start().await;
        // No cursor matcher: the mock only matches when the param is absent.
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(posts_body(1, None)))
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let page = client.search("the", Some(""), 100).await.unwrap();
        assert_eq!(page.posts.len(), 1);
    }

    #[tokio::test]
    async fn bad_request_maps_to_cursor_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":"InvalidRequest","message":"cursor too deep"}"#),
            )
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let err = client.search("the", Some("12800"), 100).await.unwrap_err();
        assert!(matches!(err, FeedError::CursorRejected(ref m) if m.contains("cursor too deep")));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let err = client.search("the", None, 100).await.unwrap_err();
        assert!(matches!(err, FeedError::Api { status: 502, .. }));
    }

    #[tokio::test]
    async fn malformed_body_maps_to_deserialize_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let err = client.search("the", None, 100).await.unwrap_err();
        assert!(matches!(err, FeedError::Deserialize { .. }));
    }

    #[tokio::test]
    async fn post_with_bad_timestamp_still_arrives_without_one() {
        let server = MockServer::start().await;
        let body = serde_json::json!({
            "posts": [{
                "uri": "at://did:plc:test/app.bsky.feed.post/x",
                "cid": "bafyreix",
                "author": { "handle": "weird.example" },
                "record": { "text": "clock drift", "createdAt": "not-a-date" }
            }]
        });
        Mock::given(method("GET"))
            .and(path("/xrpc/app.bsky.feed.searchPosts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url(5, &server.uri()).unwrap();
        let page = client.search("the", None, 100).await.unwrap();
        assert_eq!(page.posts.len(), 1);
        assert!(page.posts[0].created_at.is_none());
        assert!(page.oldest_created_at().is_none());
    }

    #[test]
    fn base_url_normalisation_tolerates_trailing_slashes() {
        let a = SearchClient::with_base_url(5, "https://api.example.com").unwrap();
        let b = SearchClient::with_base_url(5, "https://api.example.com///").unwrap();
        assert_eq!(a.base_url, b.base_url);
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = SearchClient::with_base_url(5, "not a url").unwrap_err();
        assert!(matches!(err, FeedError::InvalidBaseUrl(_)));
    }
}
