//! Vision-language backends that answer "where does the task switch?"
//! for one window of frames.
//!
//! Workers talk to a [`VlmBackend`]; [`create_backend`] picks the
//! implementation from configuration.

pub mod backend;
pub mod dummy;
pub mod error;
pub mod extract;
pub mod frames;
pub mod prompt;
pub mod remote;

pub use backend::{create_backend, BackendKind, VlmBackend};
pub use dummy::DummyBackend;
pub use error::VlmError;
pub use remote::{RemoteApiBackend, RemoteApiConfig};
