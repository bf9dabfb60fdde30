use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A full collection round failed even after its retry. Items gathered
    /// by earlier rounds stay durable for inspection.
    #[error("collection failed: {0}")]
    CollectionFailed(String),

    /// The aggregation stage could not finish. Safe to retry: the item set
    /// is already durable and unchanged.
    #[error("aggregation failed: {0}")]
    AggregationFailed(String),

    /// The publish step failed after aggregation succeeded. The run itself
    /// stays `completed`.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error(transparent)]
    Store(#[from] moodwire_store::StoreError),
}
