//! REST API module.
//!
//! Contains all API routes and handlers. Every handler answers with the
//! `{success, data, message?}` envelope or an [`AppError`].

mod auth;
mod groups;
mod repertoires;
mod songs;
mod versions;

pub use auth::*;
pub use groups::*;
pub use repertoires::*;
pub use songs::*;
pub use versions::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::Group;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            status: StatusCode::OK,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Create a 201 response for a newly created resource.
pub fn created<T: Serialize>(data: T) -> ApiResult<T> {
    let mut response = ApiResponse::new(data);
    response.status = StatusCode::CREATED;
    Ok(response)
}

// ==================== PERMISSION GATES ====================

async fn load_group(state: &AppState, group_id: &str) -> Result<Group, AppError> {
    state
        .repo
        .get_group(group_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Group {} not found", group_id)))
}

/// Load a group the caller belongs to. Site admins pass every gate.
pub(crate) async fn require_member(
    state: &AppState,
    group_id: &str,
    user: &AuthUser,
) -> Result<Group, AppError> {
    let group = load_group(state, group_id).await?;
    if user.is_admin() || group.is_member(user.id()) {
        Ok(group)
    } else {
        Err(AppError::Forbidden(
            "You are not a member of this group".to_string(),
        ))
    }
}

/// Load a group the caller leads or moderates.
pub(crate) async fn require_group_admin(
    state: &AppState,
    group_id: &str,
    user: &AuthUser,
) -> Result<Group, AppError> {
    let group = load_group(state, group_id).await?;
    if user.is_admin() || group.has_admin_permissions(user.id()) {
        Ok(group)
    } else {
        Err(AppError::Forbidden(
            "Only the group leader or a moderator can do this".to_string(),
        ))
    }
}

/// Load a group the caller leads.
pub(crate) async fn require_leader(
    state: &AppState,
    group_id: &str,
    user: &AuthUser,
) -> Result<Group, AppError> {
    let group = load_group(state, group_id).await?;
    if user.is_admin() || group.is_leader(user.id()) {
        Ok(group)
    } else {
        Err(AppError::Forbidden(
            "Only the group leader can do this".to_string(),
        ))
    }
}
