//! Starter API library
//!
//! An HTTP API whose procedures run through a fixed middleware pipeline:
//! retry, then tracing and error reporting, then (for protected procedures)
//! session gating, then the handler.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod reporting;
pub mod rpc;
pub mod server;

pub use config::Settings;
pub use error::ApiError;
pub use server::App;
