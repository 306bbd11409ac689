//! The spatial index: bounding geometry, tree nodes, the STR bulk loader,
//! the bounded best-first search, and the two-pass k-NN protocol.

pub mod bulk;
pub mod geometry;
pub mod node;
pub mod query;
pub mod search;
