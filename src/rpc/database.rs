//! Database handle middleware

use async_trait::async_trait;
use std::sync::Arc;

use super::context::{Context, ContextPatch};
use super::middleware::{Middleware, Next, ProcedureResult};
use crate::db::Database;

/// Supplies the process-wide database handle unless the context already has one
pub struct DbMiddleware {
    default: Arc<dyn Database>,
}

impl DbMiddleware {
    pub fn new(default: Arc<dyn Database>) -> Self {
        Self { default }
    }
}

#[async_trait]
impl Middleware for DbMiddleware {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn call(&self, ctx: Context, next: Next<'_>) -> ProcedureResult {
        if ctx.db().is_some() {
            return next.run(ctx).await;
        }
        next.run_with(&ctx, ContextPatch::db(self.default.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{context, MockDatabase};
    use crate::rpc::{Handler, ProcedureResult};
    use serde_json::{json, Value};

    struct PingHandler;

    #[async_trait]
    impl Handler for PingHandler {
        async fn call(&self, ctx: Context, _input: Value) -> ProcedureResult {
            let db = ctx.db().expect("db handle present");
            Ok(json!(db.ping().await.is_ok()))
        }
    }

    #[tokio::test]
    async fn test_default_handle_injected() {
        let default = MockDatabase::new(true);
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(DbMiddleware::new(default.clone()))];
        let input = Value::Null;

        let result = Next::new(&chain, &PingHandler, &input).run(context()).await;

        assert_eq!(result.unwrap(), json!(true));
        assert_eq!(default.pings(), 1);
    }

    #[tokio::test]
    async fn test_existing_handle_kept() {
        let default = MockDatabase::new(true);
        let scoped = MockDatabase::new(false);
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(DbMiddleware::new(default.clone()))];
        let input = Value::Null;

        let ctx = context().merge(ContextPatch::db(scoped.clone()));
        let result = Next::new(&chain, &PingHandler, &input).run(ctx).await;

        assert_eq!(result.unwrap(), json!(false));
        assert_eq!(default.pings(), 0);
        assert_eq!(scoped.pings(), 1);
    }
}
