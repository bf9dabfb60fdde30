//! Sentiment scoring for moodwire.
//!
//! The pipeline treats the scorer as a pure function `text -> compound score
//! in [-1, 1]` behind the [`SentimentScorer`] trait. The shipped
//! implementation is a word-lexicon scorer; a remote model can be dropped in
//! at the same seam.

pub mod error;
pub mod scorer;

pub use error::SentimentError;
pub use scorer::{compound_score, LexiconScorer, SentimentScorer};
