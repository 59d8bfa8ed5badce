//! API procedures
//!
//! Handlers are plain async functions taking the call [`Context`] and a
//! decoded input. [`router`] binds them to the procedure bases.
//!
//! [`Context`]: crate::rpc::Context

pub mod health;
pub mod session;

use std::sync::Arc;

use crate::db::Database;
use crate::rpc::{DbMiddleware, ProcedureRouter, Procedures, Route};

/// Build the procedure tree served over RPC and REST
pub fn router(procedures: &Procedures, database: Arc<dyn Database>) -> ProcedureRouter {
    let with_db = procedures.public.with(DbMiddleware::new(database));

    ProcedureRouter::new()
        .procedure(
            "health",
            procedures.public.route(
                Route::get("/health")
                    .tag("Health")
                    .summary("Health check")
                    .description("Health check endpoint"),
            )
            .handler(health::health),
        )
        .procedure(
            "ready",
            with_db
                .route(
                    Route::get("/ready")
                        .tag("Health")
                        .summary("Readiness check")
                        .description("Readiness check endpoint"),
                )
                .handler(health::ready),
        )
        .procedure(
            "me",
            procedures
                .protected
                .route(
                    Route::get("/me")
                        .tag("Session")
                        .summary("Current session")
                        .description("Session and user of the authenticated caller"),
                )
                .handler(session::me),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporting::LogReporter;
    use crate::rpc::testing::{MockDatabase, MockResolver};
    use crate::rpc::RetryPolicy;
    use axum::http::Method;

    #[test]
    fn test_procedure_tree() {
        let procedures = Procedures::new(
            RetryPolicy::new(3).unwrap(),
            Arc::new(LogReporter),
            MockResolver::anonymous(),
        );
        let router = router(&procedures, MockDatabase::new(true));

        assert_eq!(router.len(), 3);

        let (_, ready) = router.resolve_rpc("ready").unwrap();
        assert_eq!(ready.middleware_names(), vec!["retry", "observe", "db"]);

        let me = router.resolve_rest(&Method::GET, "/me").unwrap();
        assert!(me.procedure.requires_auth());

        let health = router.resolve_rest(&Method::GET, "/health").unwrap();
        assert!(!health.procedure.requires_auth());
    }
}
