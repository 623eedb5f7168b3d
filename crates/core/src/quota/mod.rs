//! API usage accounting and quota thresholds

pub mod tracker;

pub use tracker::UsageTracker;
