//! HTTP API module.
//!
//! This module provides the HTTP server and API types for the csv2bufr service.

pub mod server;
pub mod types;

pub use server::{router, run_transform, start_server, AppState};
pub use types::*;
