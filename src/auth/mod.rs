//! Bearer-token authentication.
//!
//! The middleware verifies any presented token and attaches its claims to the
//! request. Handlers that need an identity take an [`AuthUser`] argument,
//! which rejects anonymous requests with 401.

mod password;
mod token;

pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenService};

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::errors::AppError;

/// Authentication layer: verifies `Authorization: Bearer <token>` when present.
///
/// Requests without a credential pass through anonymously; requests with an
/// invalid or expired one are rejected.
pub async fn bearer_auth_layer(
    tokens: Arc<TokenService>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let Some(value) = header_value else {
        return next.run(request).await;
    };

    let Some(token) = value.strip_prefix("Bearer ").map(str::trim) else {
        return AppError::Unauthorized("Expected a Bearer token".to_string()).into_response();
    };

    match tokens.verify(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            tracing::debug!("Rejected bearer token: {}", e);
            AppError::Unauthorized(e.to_string()).into_response()
        }
    }
}

/// Authenticated caller, extracted from the claims the auth layer attached.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.sub
    }

    pub fn is_admin(&self) -> bool {
        self.0.is_admin()
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

/// Perform constant-time string comparison.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    // Constant-time comparison
    a_bytes.ct_eq(b_bytes).into()
}
