//! Search-source client for moodwire.
//!
//! Wraps the public AppView `searchPosts` endpoint: newest-first results,
//! an opaque cursor that is a decimal result offset, and a documented habit
//! of rejecting requests at very large offsets. The [`SearchSource`] trait
//! is the seam the collector fans out over; tests script it directly.

pub mod client;
pub mod cursor;
pub mod error;
pub mod source;
pub mod types;

pub use client::SearchClient;
pub use error::FeedError;
pub use source::SearchSource;
pub use types::{FeedPost, SearchPage};
