//! Procedure pipeline
//!
//! Every API call is a [`Procedure`]: an ordered middleware chain ending in
//! a typed handler. Two bases are exported through [`Procedures`]:
//!
//! - `public`: retry, then observe (tracing and error reporting)
//! - `protected`: `public`, then the auth-gate
//!
//! Retry is outermost so that a failed attempt re-runs the auth-gate and the
//! handler together.

pub mod auth;
pub mod context;
pub mod database;
pub mod middleware;
pub mod observe;
pub mod procedure;
pub mod retry;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::AuthMiddleware;
pub use context::{ClientInfo, Context, ContextPatch, ResponseHeaders, RetryState};
pub use database::DbMiddleware;
pub use middleware::{Handler, Middleware, Next, ProcedureResult};
pub use observe::ObserveMiddleware;
pub use procedure::{build_chain, Chain, NoInput, Procedure, ProcedureBuilder, Procedures, Route};
pub use retry::{Backoff, InvalidRetryPolicy, RetryMiddleware, RetryPolicy};
pub use router::{ProcedureRouter, RestMatch};
