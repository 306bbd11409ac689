//! Summarization: DFT coefficient points (with the sliding recurrence),
//! landmark clustering over the residual band, and segmentation of series
//! into index entries.

pub mod dft;
pub mod landmarks;
pub mod segmentation;
