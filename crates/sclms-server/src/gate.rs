//! Authentication gate.
//!
//! The middleware never rejects a request itself. It resolves the bearer
//! token (if any) into an [`AuthContext`] stored in the request
//! extensions, and the [`Authenticated`] / [`AdminPrincipal`] extractors
//! decide per route whether that context is good enough.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use sclms_auth::{AuthError, Principal};
use sclms_core::models::account::Role;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// What the gate learned about the caller.
#[derive(Debug, Clone)]
pub enum AuthContext {
    /// No bearer token was presented.
    Anonymous,
    Authenticated(Arc<Principal>),
    /// A token was presented and refused.
    Rejected,
    /// The token could not be checked because the store was unreachable.
    Unavailable,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim().to_string())
}

pub async fn authentication_gate(
    State(state): State<AppState>,
    method: Method,
    mut request: Request,
    next: Next,
) -> Response {
    let context = match bearer_token(request.headers()) {
        None => AuthContext::Anonymous,
        Some(token) if token.is_empty() => AuthContext::Rejected,
        Some(token) => match state.auth.authenticate_token(&token).await {
            Ok(principal) => {
                debug!(account_id = %principal.account.id, "Bearer token accepted");
                AuthContext::Authenticated(Arc::new(principal))
            }
            Err(e) if e.is_retryable() => {
                warn!(event = "token.unverified", error = %e, "Bearer token could not be checked");
                AuthContext::Unavailable
            }
            Err(e) => {
                warn!(
                    event = "token.rejected",
                    %method,
                    path = %request.uri().path(),
                    reason = %e,
                    "Bearer token rejected"
                );
                AuthContext::Rejected
            }
        },
    };

    request.extensions_mut().insert(context);
    next.run(request).await
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or(AuthContext::Anonymous))
    }
}

/// A caller holding a valid token for an existing account.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Arc<Principal>);

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(context) = AuthContext::from_request_parts(parts, state).await;
        match context {
            AuthContext::Authenticated(principal) => Ok(Authenticated(principal)),
            AuthContext::Unavailable => Err(AuthError::StoreUnavailable(
                "token could not be verified".into(),
            )
            .into()),
            AuthContext::Anonymous | AuthContext::Rejected => Err(ApiError::Unauthorized),
        }
    }
}

/// An authenticated caller holding `ROLE_ADMIN`.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Arc<Principal>);

impl<S> FromRequestParts<S> for AdminPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Authenticated(principal) = Authenticated::from_request_parts(parts, state).await?;
        if !principal.has_role(Role::Admin) {
            warn!(
                event = "access.denied",
                account_id = %principal.account.id,
                "Administrator role required"
            );
            return Err(ApiError::Forbidden);
        }
        Ok(AdminPrincipal(principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def".into()));
        assert_eq!(bearer_token(&headers("bearer  abc")), Some("abc".into()));
    }

    #[test]
    fn other_schemes_are_anonymous() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
