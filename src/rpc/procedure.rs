//! Procedure composition
//!
//! A [`Chain`] is an immutable, ordered list of middlewares. Extending a
//! chain returns a new one, so the public and protected bases can share a
//! prefix without either observing the other's additions. Attaching a
//! handler turns a chain into a [`Procedure`].

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use validator::{Validate, ValidationErrors};

use super::auth::AuthMiddleware;
use super::context::Context;
use super::middleware::{Handler, Middleware, Next, ProcedureResult};
use super::observe::ObserveMiddleware;
use super::retry::{RetryMiddleware, RetryPolicy};
use crate::auth::SessionResolver;
use crate::error::ApiError;
use crate::reporting::ErrorReporter;

/// Input type for procedures that take no arguments
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoInput {}

impl Validate for NoInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// REST binding and documentation of a procedure
#[derive(Debug, Clone)]
pub struct Route {
    pub method: Method,
    /// Path template; `{name}` segments become input fields
    pub path: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub success_status: StatusCode,
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            summary: None,
            description: None,
            tags: Vec::new(),
            success_status: StatusCode::OK,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn success_status(mut self, status: StatusCode) -> Self {
        self.success_status = status;
        self
    }
}

/// Ordered, immutable middleware stack
#[derive(Clone)]
pub struct Chain {
    middlewares: Arc<[Arc<dyn Middleware>]>,
}

impl Default for Chain {
    fn default() -> Self {
        build_chain(Vec::new())
    }
}

/// Compose middlewares into a chain; the first element runs outermost
pub fn build_chain(middlewares: Vec<Arc<dyn Middleware>>) -> Chain {
    Chain {
        middlewares: middlewares.into(),
    }
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new chain with `middleware` appended innermost
    pub fn with(&self, middleware: impl Middleware + 'static) -> Chain {
        self.with_arc(Arc::new(middleware))
    }

    pub fn with_arc(&self, middleware: Arc<dyn Middleware>) -> Chain {
        let mut middlewares = self.middlewares.to_vec();
        middlewares.push(middleware);
        build_chain(middlewares)
    }

    /// Middleware names, outermost first
    pub fn names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    pub fn route(&self, route: Route) -> ProcedureBuilder {
        ProcedureBuilder {
            chain: self.clone(),
            route: Some(route),
        }
    }

    /// Procedure reachable over RPC only
    pub fn handler<F, Fut, I, O>(&self, f: F) -> Procedure
    where
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
        I: DeserializeOwned + Validate + Send + 'static,
        O: Serialize + Send + 'static,
    {
        ProcedureBuilder {
            chain: self.clone(),
            route: None,
        }
        .handler(f)
    }

    /// Terminate the chain with an untyped handler
    pub fn raw_handler(&self, route: Option<Route>, handler: impl Handler + 'static) -> Procedure {
        Procedure {
            route,
            middlewares: self.middlewares.clone(),
            handler: Arc::new(handler),
        }
    }
}

pub struct ProcedureBuilder {
    chain: Chain,
    route: Option<Route>,
}

impl ProcedureBuilder {
    pub fn handler<F, Fut, I, O>(self, f: F) -> Procedure
    where
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
        I: DeserializeOwned + Validate + Send + 'static,
        O: Serialize + Send + 'static,
    {
        self.chain.raw_handler(
            self.route,
            FnHandler {
                f,
                _types: PhantomData,
            },
        )
    }
}

struct FnHandler<F, I, O> {
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

#[async_trait]
impl<F, Fut, I, O> Handler for FnHandler<F, I, O>
where
    F: Fn(Context, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
    I: DeserializeOwned + Validate + Send + 'static,
    O: Serialize + Send + 'static,
{
    async fn call(&self, ctx: Context, input: Value) -> ProcedureResult {
        let input = decode_input::<I>(input)?;
        let output = (self.f)(ctx, input).await?;
        serde_json::to_value(output).map_err(|e| ApiError::Internal(e.into()))
    }
}

/// Decode and validate raw input; a missing body counts as `{}`
fn decode_input<I>(input: Value) -> Result<I, ApiError>
where
    I: DeserializeOwned + Validate,
{
    let input = match input {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };

    let decoded: I =
        serde_json::from_value(input).map_err(|e| ApiError::invalid_input(e.to_string()))?;
    decoded.validate()?;
    Ok(decoded)
}

/// A middleware chain terminated by a handler
#[derive(Clone)]
pub struct Procedure {
    route: Option<Route>,
    middlewares: Arc<[Arc<dyn Middleware>]>,
    handler: Arc<dyn Handler>,
}

impl Procedure {
    /// Execute the chain for one call
    pub async fn call(&self, ctx: Context, input: Value) -> ProcedureResult {
        Next::new(&self.middlewares, self.handler.as_ref(), &input)
            .run(ctx)
            .await
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Whether the chain contains the auth-gate
    pub fn requires_auth(&self) -> bool {
        self.middlewares.iter().any(|m| m.name() == "auth")
    }
}

/// The two exported procedure bases
#[derive(Clone)]
pub struct Procedures {
    /// retry, then observe
    pub public: Chain,
    /// public, then auth-gate
    pub protected: Chain,
}

impl Procedures {
    pub fn new(
        retry: RetryPolicy,
        reporter: Arc<dyn ErrorReporter>,
        resolver: Arc<dyn SessionResolver>,
    ) -> Self {
        let public = build_chain(vec![
            Arc::new(RetryMiddleware::new(retry)),
            Arc::new(ObserveMiddleware::new(reporter)),
        ]);
        let protected = public.with(AuthMiddleware::new(resolver));

        tracing::debug!(
            public = ?public.names(),
            protected = ?protected.names(),
            "Procedure bases built"
        );

        Self { public, protected }
    }
}
