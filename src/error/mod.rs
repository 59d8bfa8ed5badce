//! Error handling module
//!
//! Every failure that can escape a procedure call is an [`ApiError`].

pub mod types;

pub use types::{ApiError, ErrorResponse};
