use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream rejected the request outright — seen at very large
    /// cursor offsets where the search backend stops paginating.
    #[error("search request rejected: {0}")]
    CursorRejected(String),

    #[error("search API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to deserialize {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}
