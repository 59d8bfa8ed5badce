//! Session introspection

use crate::auth::SessionData;
use crate::error::ApiError;
use crate::rpc::{Context, NoInput};

/// GET /me: the caller's session and user
pub async fn me(ctx: Context, _input: NoInput) -> Result<SessionData, ApiError> {
    match (ctx.session(), ctx.user()) {
        (Some(session), Some(user)) => Ok(SessionData {
            session: session.clone(),
            user: user.clone(),
        }),
        _ => Err(ApiError::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::{context, sample_session, sample_user};
    use crate::rpc::ContextPatch;

    #[tokio::test]
    async fn test_returns_authenticated_caller() {
        let ctx = context().merge(ContextPatch::auth(sample_session(), sample_user()));
        let data = me(ctx, NoInput::default()).await.unwrap();

        assert_eq!(data.user.id, "usr_1");
        assert_eq!(data.session.id, "ses_1");
    }

    #[tokio::test]
    async fn test_anonymous_is_unauthorized() {
        let err = me(context(), NoInput::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }
}
