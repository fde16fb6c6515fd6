//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to an identity,
//! resolves the identity's role, and injects the [`Session`] into request
//! extensions for downstream handlers. The session keeps the token so every
//! store call for this request runs as the caller.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::session::{resolve_session, AccessToken, Session};

/// Require a valid bearer token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_session(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_session_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_session_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .trim()
        .to_string();

    let identity = ctx.auth.authenticate(&token).await?;
    let token = AccessToken::new(token);
    let store = ctx.store.for_user(token.as_str());
    let session: Session = resolve_session(&store, identity)
        .await
        .with_access_token(token);

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}
