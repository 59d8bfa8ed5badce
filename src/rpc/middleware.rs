//! Middleware primitive
//!
//! A middleware receives the current [`Context`] and a [`Next`] cursor over
//! the remainder of the chain. It either proceeds (possibly with a context
//! patch), proceeds repeatedly inside error handling, or short-circuits by
//! returning without touching `next`.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::context::{Context, ContextPatch};
use crate::error::ApiError;

/// Outcome of a procedure call before it is serialized by a transport
pub type ProcedureResult = Result<Value, ApiError>;

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name used in logs and chain introspection
    fn name(&self) -> &'static str;

    async fn call(&self, ctx: Context, next: Next<'_>) -> ProcedureResult;
}

/// Terminal step of a chain
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, ctx: Context, input: Value) -> ProcedureResult;
}

/// Cursor over the rest of a chain.
///
/// `Next` is `Copy`: running it twice re-executes every remaining middleware
/// and the handler, which is what the retry middleware relies on.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [Arc<dyn Middleware>],
    handler: &'a dyn Handler,
    input: &'a Value,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        middlewares: &'a [Arc<dyn Middleware>],
        handler: &'a dyn Handler,
        input: &'a Value,
    ) -> Self {
        Self {
            middlewares,
            handler,
            input,
        }
    }

    /// Invoke the remainder of the chain with `ctx` as-is
    pub async fn run(self, ctx: Context) -> ProcedureResult {
        match self.middlewares.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    middlewares: rest,
                    ..self
                };
                current.call(ctx, next).await
            }
            None => self.handler.call(ctx, self.input.clone()).await,
        }
    }

    /// Invoke the remainder of the chain with `patch` merged over `ctx`
    pub async fn run_with(self, ctx: &Context, patch: ContextPatch) -> ProcedureResult {
        self.run(ctx.merge(patch)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{context, RecordingHandler};
    use std::sync::Mutex;

    struct Tag {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Middleware for Tag {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn call(&self, ctx: Context, next: Next<'_>) -> ProcedureResult {
            self.log.lock().unwrap().push(format!("enter {}", self.label));
            let result = next.run(ctx).await;
            self.log.lock().unwrap().push(format!("exit {}", self.label));
            result
        }
    }

    struct Reject;

    #[async_trait]
    impl Middleware for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        async fn call(&self, _ctx: Context, _next: Next<'_>) -> ProcedureResult {
            Err(ApiError::Forbidden("nope".into()))
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Tag { label: "outer", log: log.clone() }),
            Arc::new(Tag { label: "inner", log: log.clone() }),
        ];
        let handler = RecordingHandler::succeeding(serde_json::json!({"ok": true}));
        let input = Value::Null;

        let result = Next::new(&chain, &handler, &input).run(context()).await;

        assert_eq!(result.unwrap(), serde_json::json!({"ok": true}));
        assert_eq!(handler.calls(), 1);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["enter outer", "enter inner", "exit inner", "exit outer"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(Reject)];
        let handler = RecordingHandler::succeeding(Value::Null);
        let input = Value::Null;

        let result = Next::new(&chain, &handler, &input).run(context()).await;

        assert!(matches!(result, Err(ApiError::Forbidden(_))));
        assert_eq!(handler.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler_with_input() {
        let handler = RecordingHandler::succeeding(Value::Null);
        let input = serde_json::json!({"name": "ada"});

        Next::new(&[], &handler, &input).run(context()).await.unwrap();

        assert_eq!(handler.last_input(), Some(input));
    }
}
