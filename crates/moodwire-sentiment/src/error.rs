use thiserror::Error;

#[derive(Debug, Error)]
pub enum SentimentError {
    /// The scorer backend could not be reached. The lexicon scorer never
    /// produces this; remote implementations of the seam do.
    #[error("sentiment scorer unavailable: {0}")]
    Unavailable(String),
}
