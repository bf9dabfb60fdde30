//! The moodwire pipeline: collection, coordination, aggregation, reporting.
//!
//! Stages exchange state only through the [`moodwire_store::RunStore`]
//! contract, so a cycle can run in one process loop or be re-dispatched
//! stage by stage across invocations — the coordination model is the same
//! either way.

pub mod aggregator;
pub mod collector;
pub mod coordinator;
pub mod error;
pub mod report;
pub mod types;

pub use aggregator::aggregate_run;
pub use collector::Collector;
pub use coordinator::{check_completion, drive_run, run_cycle, start_run, RunOutcome, RunReport};
pub use error::PipelineError;
pub use report::{format_quiet, format_summary, LogPublisher, Publisher, PublishReceipt};
pub use types::{
    AggregateOutcome, CollectorConfig, MoodSummary, PipelineConfig, RankedItem,
    SentimentCategory, StopReason,
};
