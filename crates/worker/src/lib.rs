//! Inference worker: pulls window jobs from the dispatch server, runs a
//! VLM backend over the frames and submits the answer.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod runner;

pub use client::ServerClient;
pub use config::WorkerConfig;
pub use error::WorkerError;
pub use runner::Worker;
