//! Build deduplication.
//!
//! Expensive keyed builds (machine images, mostly) are funnelled through a
//! single worker task that runs each key at most once and serializes all
//! builds. Outcomes, including failures, are returned to callers as data.

mod worker;

pub use worker::{BuildDeduplicator, DedupConfig};
