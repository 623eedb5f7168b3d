//! Incremental sync coordination

pub mod coordinator;
pub mod pipeline;
pub mod ports;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::SyncCoordinator;
pub use pipeline::{EtlPipeline, PipelineRunSummary, DEFAULT_RESOURCES};
pub use ports::{AlertSink, FeedQuery, ListingFeed, ListingStore};
