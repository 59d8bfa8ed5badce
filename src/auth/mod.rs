//! External auth service collaborator
//!
//! Sessions are owned by a separate auth service. This module resolves
//! sessions from inbound request headers and proxies the service's own
//! endpoints (`/api/auth/*`) without passing through the procedure chain.

pub mod client;
pub mod types;

pub use client::{AuthProxy, HttpAuthClient, ProxyRequest, SessionResolver};
pub use types::{Session, SessionData, User};
