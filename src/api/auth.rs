//! Account endpoints: registration, login and the current user.

use axum::{extract::State, Json};

use super::{created, success, ApiResult};
use crate::auth::{hash_password, verify_password, AuthUser};
use crate::errors::AppError;
use crate::models::{CredentialsRequest, LoginResponse, User, UserRole};
use crate::AppState;

/// POST /api/auth/register - Create an account and sign it in.
///
/// The very first account becomes a site admin.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<LoginResponse> {
    let username = request
        .validate_for_registration()
        .map_err(AppError::Validation)?;

    let role = if state.repo.count_users().await? == 0 {
        UserRole::Admin
    } else {
        UserRole::User
    };

    let user = state
        .repo
        .create_user(&username, &hash_password(&request.password), role)
        .await?;
    tracing::info!(user_id = %user.id, role = role.as_str(), "Registered user {}", user.username);

    let token = state.tokens.issue(&user);
    created(LoginResponse { token, user })
}

/// POST /api/auth/login - Exchange credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<LoginResponse> {
    let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

    let user = state
        .repo
        .get_user_by_username(request.username.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(&request.password, &user.password_hash) {
        tracing::debug!("Failed login for {}", user.username);
        return Err(invalid());
    }

    let token = state.tokens.issue(&user);
    success(LoginResponse { token, user })
}

/// GET /api/auth/me - The authenticated user.
pub async fn me(State(state): State<AppState>, user: AuthUser) -> ApiResult<User> {
    let account = state
        .repo
        .get_user(user.id())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Account no longer exists".to_string()))?;
    success(account)
}
