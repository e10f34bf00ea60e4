//! Group API endpoints: groups, invitations, members and moderators.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{
    created, require_group_admin, require_leader, require_member, success, ApiResponse,
    ApiResult,
};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{
    CreateGroupRequest, Group, JoinGroupRequest, UpdateGroupRequest, UserRefRequest,
};
use crate::AppState;

/// GET /api/groups - Groups of the caller; site admins see every group.
pub async fn list_groups(State(state): State<AppState>, user: AuthUser) -> ApiResult<Vec<Group>> {
    let groups = if user.is_admin() {
        state.repo.list_groups().await?
    } else {
        state.repo.list_groups_for_user(user.id()).await?
    };
    success(
        groups
            .iter()
            .map(|g| g.view_for(user.id(), user.is_admin()))
            .collect(),
    )
}

/// GET /api/groups/:id - A group the caller belongs to.
pub async fn get_group(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Group> {
    let group = require_member(&state, &id, &user).await?;
    success(group.view_for(user.id(), user.is_admin()))
}

/// POST /api/groups - Create a group led by the caller.
pub async fn create_group(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<Group> {
    let group = state.repo.create_group(&request, user.id()).await?;
    tracing::info!(group_id = %group.id, code = %group.group_id, "Created group {}", group.name);
    created(group)
}

/// PUT /api/groups/:id - Update name, description or church.
pub async fn update_group(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateGroupRequest>,
) -> ApiResult<Group> {
    require_group_admin(&state, &id, &user).await?;

    let name = match request.name.as_deref().map(str::trim) {
        Some("") => {
            return Err(AppError::Validation(
                "Group name cannot be empty".to_string(),
            ))
        }
        Some(name) => {
            if state.repo.group_name_taken(name, Some(id.as_str())).await? {
                return Err(AppError::Validation(format!(
                    "A group named {} already exists",
                    name
                )));
            }
            Some(name.to_string())
        }
        None => None,
    };

    let (group, ()) = state
        .repo
        .modify_group(&id, request.expected_version, |g| {
            if let Some(name) = name {
                g.name = name;
            }
            if let Some(description) = request.description {
                g.description = Some(description);
            }
            if let Some(church) = request.church {
                g.church = Some(church);
            }
            Ok(())
        })
        .await?;

    success(group)
}

/// DELETE /api/groups/:id - Delete a group. Leader only.
pub async fn delete_group(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    require_leader(&state, &id, &user).await?;
    if !state.repo.delete_group(&id).await? {
        return Err(AppError::NotFound(format!("Group {} not found", id)));
    }
    tracing::info!(group_id = %id, "Deleted group");
    Ok(ApiResponse::new(()).with_message("Group deleted"))
}

/// POST /api/groups/:id/regenerate-code - Replace the invitation code.
pub async fn regenerate_invitation_code(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Group> {
    require_group_admin(&state, &id, &user).await?;
    let (group, ()) = state
        .repo
        .modify_group(&id, None, |g| {
            g.regenerate_invitation_code();
            Ok(())
        })
        .await?;
    Ok(ApiResponse::new(group).with_message("Invitation code regenerated; share the new code"))
}

/// POST /api/groups/:id/toggle-invitation - Enable or disable joining by code.
pub async fn toggle_invitation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Group> {
    require_group_admin(&state, &id, &user).await?;
    let (group, enabled) = state
        .repo
        .modify_group(&id, None, |g| Ok(g.toggle_invitation()))
        .await?;
    let message = if enabled {
        "Invitations enabled"
    } else {
        "Invitations disabled"
    };
    Ok(ApiResponse::new(group).with_message(message))
}

async fn join(
    state: &AppState,
    user: &AuthUser,
    group_id: &str,
    invitation_code: &str,
) -> ApiResult<Group> {
    let (group, ()) = state
        .repo
        .modify_group(group_id, None, |g| g.add_member(user.id(), invitation_code))
        .await?;
    tracing::info!(group_id = %group.id, user_id = %user.id(), "User joined group");
    success(group.view_for(user.id(), user.is_admin()))
}

/// POST /api/groups/join - Join the group matching an invitation code.
pub async fn join_group(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<JoinGroupRequest>,
) -> ApiResult<Group> {
    let group = state
        .repo
        .get_group_by_invitation_code(&request.invitation_code)
        .await?
        .ok_or_else(|| AppError::NotFound("No group matches this invitation code".to_string()))?;
    join(&state, &user, &group.id, &request.invitation_code).await
}

/// POST /api/groups/:id/members - Join a known group with its invitation code.
pub async fn add_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<JoinGroupRequest>,
) -> ApiResult<Group> {
    join(&state, &user, &id, &request.invitation_code).await
}

/// DELETE /api/groups/:id/members/:user_id - Remove a member, or leave.
pub async fn remove_member(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, member_id)): Path<(String, String)>,
) -> ApiResult<Group> {
    if member_id != user.id() {
        require_group_admin(&state, &id, &user).await?;
    }
    let (group, ()) = state
        .repo
        .modify_group(&id, None, |g| g.remove_member(&member_id))
        .await?;
    tracing::info!(group_id = %id, user_id = %member_id, "Removed member");
    success(group.view_for(user.id(), user.is_admin()))
}

/// POST /api/groups/:id/moderators - Promote a member. Leader only.
pub async fn add_moderator(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UserRefRequest>,
) -> ApiResult<Group> {
    require_leader(&state, &id, &user).await?;
    let (group, ()) = state
        .repo
        .modify_group(&id, None, |g| g.add_moderator(request.user_id.as_str()))
        .await?;
    success(group)
}

/// DELETE /api/groups/:id/moderators/:user_id - Demote a moderator. Leader only.
pub async fn remove_moderator(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, moderator_id)): Path<(String, String)>,
) -> ApiResult<Group> {
    require_leader(&state, &id, &user).await?;
    let (group, ()) = state
        .repo
        .modify_group(&id, None, |g| g.remove_moderator(&moderator_id))
        .await?;
    success(group)
}
