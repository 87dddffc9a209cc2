//! Testing utilities for daebug's own integration tests.
//!
//! - [`TestServer`] - wrapper around `axum-test` for the HTTP dispatcher
//! - assertion helpers for the poll/result wire protocol

pub mod assertions;
pub mod server;

pub use assertions::*;
pub use server::TestServer;
