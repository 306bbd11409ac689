//! Shared data model: configuration, datasets and rolling statistics,
//! candidate segments, and the concurrency primitives (shrinking threshold,
//! shared top-k heap).

pub mod config;
pub mod dataset;
pub mod segment;
pub mod threshold;
pub mod topk;
