//! Server module
//!
//! Application state, transports, routing and server lifecycle.

pub mod app;
pub mod dispatch;
pub mod openapi;
pub mod rest;
pub mod routes;
pub mod rpc;
pub mod state;

pub use app::App;
pub use routes::create_router;
pub use state::{AppState, Collaborators};
