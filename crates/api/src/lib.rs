//! Dispatch server library.
//!
//! Exposes config, state, error handling, routes and the router builder
//! so integration tests and the `v2t-server` binary share them.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod shutdown;
pub mod state;
