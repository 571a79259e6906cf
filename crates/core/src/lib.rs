//! Domain model and pure algorithms for video task segmentation.
//!
//! Everything in this crate is free of I/O: window planning, the job
//! queue bookkeeping, the per-sample status machine and the segment
//! reconstruction algorithm. The store, pipeline and server crates build
//! on top of it.

pub mod error;
pub mod job;
pub mod queue;
pub mod sample_state;
pub mod segments;
pub mod types;
pub mod windowing;
