//! Auth-gating middleware
//!
//! Lets a call through only with a resolved session and user. A session
//! already present in the context is reused as-is, so stacking the gate
//! twice in one chain costs at most one trip to the auth service.

use async_trait::async_trait;
use std::sync::Arc;

use super::context::{Context, ContextPatch};
use super::middleware::{Middleware, Next, ProcedureResult};
use crate::auth::{SessionData, SessionResolver};
use crate::error::ApiError;

pub struct AuthMiddleware {
    resolver: Arc<dyn SessionResolver>,
}

impl AuthMiddleware {
    pub fn new(resolver: Arc<dyn SessionResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn call(&self, ctx: Context, next: Next<'_>) -> ProcedureResult {
        let resolved = match ctx.session() {
            Some(session) => ctx.user().map(|user| SessionData {
                session: session.clone(),
                user: user.clone(),
            }),
            None => self.resolver.get_session(ctx.request_headers()).await?,
        };

        let Some(SessionData { session, user }) = resolved else {
            tracing::debug!(path = %ctx.path(), "Rejecting call without a session");
            return Err(ApiError::Unauthorized);
        };

        next.run_with(&ctx, ContextPatch::auth(session, user)).await
    }
}
