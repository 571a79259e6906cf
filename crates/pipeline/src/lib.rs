//! Work-dispatch engine: turns a catalog of sample videos into window
//! jobs, hands them to workers, records results and finalizes samples.
//!
//! The HTTP surface lives in `v2t-api`; this crate owns everything behind
//! it. [`Dispatcher`] and [`ResultIntake`] serve request handlers, while a
//! single [`Orchestrator`] task drives production and finalization.

pub mod catalog;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ffmpeg;
pub mod frames;
pub mod intake;
pub mod orchestrator;
pub mod progress;
pub mod sample;

pub use catalog::{Dataset, DatasetSpec, VideoLocator};
pub use config::PipelineConfig;
pub use dispatcher::Dispatcher;
pub use error::PipelineError;
pub use frames::{FrameEncoding, FrameSource, FrameSourceError, VideoInfo};
pub use intake::{ResultIntake, SubmitOutcome};
pub use orchestrator::{Orchestrator, RunExit, Step};
pub use progress::{Progress, ProgressSnapshot};
pub use sample::{FinalizeOutcome, PlanOutcome, SampleContext, SampleDriver};
