//! Middleware module
//!
//! Connection-level HTTP middleware. These layers wrap the whole router and
//! run once per HTTP request, outside any procedure chain.

pub mod cors;
pub mod logging;

pub use cors::{cors, CorsPolicy};
pub use logging::{log_request, RequestIds, REQUEST_ID_HEADER, TRACE_ID_HEADER};
