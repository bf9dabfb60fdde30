//! The [`SearchSource`] seam between the collector and the outside world.

use async_trait::async_trait;

use crate::client::SearchClient;
use crate::error::FeedError;
use crate::types::SearchPage;

/// A paginated, newest-first search source.
///
/// Implemented by [`SearchClient`] for the real AppView; collector tests
/// implement it with scripted synthetic pages.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch one page. `cursor = None` (or empty) means the start of the
    /// result set.
    async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<SearchPage, FeedError>;
}

#[async_trait]
impl SearchSource for SearchClient {
    async fn search(
        &self,
        query: &str,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<SearchPage, FeedError> {
        SearchClient::search(self, query, cursor, limit).await
    }
}
