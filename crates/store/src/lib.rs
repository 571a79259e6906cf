//! On-disk run state: per-sample result logs, segment artifacts and done
//! markers, plus the per-sample locks that serialise writers.
//!
//! Layout under the run base directory:
//!
//! ```text
//! <base>/<subset>/<run_id>/samples/<sample_id>/windows.jsonl
//! <base>/<subset>/<run_id>/samples/<sample_id>/segments.json
//! <base>/<subset>/<run_id>/samples/<sample_id>/.DONE
//! ```

pub mod error;
pub mod locks;
pub mod log;
pub mod run;

pub use error::StoreError;
pub use locks::SampleLocks;
pub use run::{RunStore, SamplePaths};
