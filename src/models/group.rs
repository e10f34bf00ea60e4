//! Group model: membership tiers and invitation codes.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::EntityRef;
use crate::errors::AppError;

const INVITATION_CODE_LEN: usize = 8;
const GROUP_CODE_LEN: usize = 6;

/// A church music team owning songs and repertoires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    /// Human-shareable generated identifier, e.g. `GRP-4K7Q2M`.
    pub group_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub church: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invitation_code: Option<String>,
    pub invitation_enabled: bool,
    pub leader: String,
    #[serde(default)]
    pub moderators: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

fn random_code(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}

pub fn generate_invitation_code() -> String {
    random_code(INVITATION_CODE_LEN)
}

pub fn generate_group_id() -> String {
    format!("GRP-{}", random_code(GROUP_CODE_LEN))
}

/// Canonical form used to compare invitation codes.
pub fn normalize_invitation_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Group {
    pub fn is_leader(&self, user_id: &str) -> bool {
        self.leader == user_id
    }

    pub fn is_moderator(&self, user_id: &str) -> bool {
        self.moderators.iter().any(|m| m == user_id)
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.is_leader(user_id) || self.members.iter().any(|m| m == user_id)
    }

    /// Leader or moderator.
    pub fn has_admin_permissions(&self, user_id: &str) -> bool {
        self.is_leader(user_id) || self.is_moderator(user_id)
    }

    /// Join `user_id` to the group through the invitation gate.
    pub fn add_member(&mut self, user_id: &str, invitation_code: &str) -> Result<(), AppError> {
        if !self.invitation_enabled {
            return Err(AppError::Forbidden(
                "Invitations are disabled for this group".to_string(),
            ));
        }
        if let Some(expected) = self
            .invitation_code
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            if normalize_invitation_code(expected) != normalize_invitation_code(invitation_code) {
                return Err(AppError::Validation("Invalid invitation code".to_string()));
            }
        }
        if self.is_member(user_id) {
            return Err(AppError::Validation(
                "User is already a member of this group".to_string(),
            ));
        }
        self.members.push(user_id.to_string());
        Ok(())
    }

    /// Remove a member. The leader cannot leave or be removed.
    pub fn remove_member(&mut self, user_id: &str) -> Result<(), AppError> {
        if self.is_leader(user_id) {
            return Err(AppError::Validation(
                "The group leader cannot be removed".to_string(),
            ));
        }
        if !self.members.iter().any(|m| m == user_id) {
            return Err(AppError::NotFound(format!(
                "User {} is not a member of this group",
                user_id
            )));
        }
        self.members.retain(|m| m != user_id);
        self.moderators.retain(|m| m != user_id);
        Ok(())
    }

    pub fn add_moderator(&mut self, user_id: &str) -> Result<(), AppError> {
        if !self.is_member(user_id) {
            return Err(AppError::Validation(
                "Only group members can become moderators".to_string(),
            ));
        }
        if self.is_leader(user_id) {
            return Err(AppError::Validation(
                "The leader already has full permissions".to_string(),
            ));
        }
        if self.is_moderator(user_id) {
            return Err(AppError::Validation(
                "User is already a moderator".to_string(),
            ));
        }
        self.moderators.push(user_id.to_string());
        Ok(())
    }

    pub fn remove_moderator(&mut self, user_id: &str) -> Result<(), AppError> {
        if !self.is_moderator(user_id) {
            return Err(AppError::NotFound(format!(
                "User {} is not a moderator of this group",
                user_id
            )));
        }
        self.moderators.retain(|m| m != user_id);
        Ok(())
    }

    /// Replace the invitation code. The old code stops working immediately.
    pub fn regenerate_invitation_code(&mut self) -> &str {
        self.invitation_code = Some(generate_invitation_code());
        self.invitation_code.as_deref().unwrap_or_default()
    }

    pub fn toggle_invitation(&mut self) -> bool {
        self.invitation_enabled = !self.invitation_enabled;
        self.invitation_enabled
    }

    /// Copy of the group as seen by `user_id`: only admins see the invitation code.
    pub fn view_for(&self, user_id: &str, is_site_admin: bool) -> Group {
        let mut view = self.clone();
        if !(is_site_admin || self.has_admin_permissions(user_id)) {
            view.invitation_code = None;
        }
        view
    }
}

/// Request body for creating a group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub church: Option<String>,
}

/// Request body for updating a group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub church: Option<String>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for joining a group.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupRequest {
    #[serde(default)]
    pub invitation_code: String,
}

/// Request body naming a user, e.g. when promoting a moderator.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRefRequest {
    pub user_id: EntityRef,
}
