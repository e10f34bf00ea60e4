//! Group persistence.

use chrono::Utc;
use sqlx::Row;

use super::repository::{check_expected_version, concurrent_modification, parse_json, to_json};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    generate_group_id, generate_invitation_code, normalize_invitation_code, CreateGroupRequest,
    Group,
};

const GROUP_COLUMNS: &str = "id, group_code, name, description, church, invitation_code, \
    invitation_enabled, leader_id, moderators, members, created_at, updated_at, version";

impl Repository {
    /// List every group, oldest first.
    pub async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM music_groups ORDER BY created_at",
            GROUP_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    /// Groups whose member set contains `user_id`.
    pub async fn list_groups_for_user(&self, user_id: &str) -> Result<Vec<Group>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM music_groups \
             WHERE EXISTS (SELECT 1 FROM json_each(music_groups.members) WHERE value = ?) \
             ORDER BY created_at",
            GROUP_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(group_from_row).collect())
    }

    pub async fn get_group(&self, id: &str) -> Result<Option<Group>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM music_groups WHERE id = ?",
            GROUP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(group_from_row))
    }

    /// Find a group by invitation code, ignoring case and surrounding whitespace.
    pub async fn get_group_by_invitation_code(
        &self,
        code: &str,
    ) -> Result<Option<Group>, AppError> {
        let code = normalize_invitation_code(code);
        if code.is_empty() {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {} FROM music_groups WHERE UPPER(TRIM(invitation_code)) = ?",
            GROUP_COLUMNS
        ))
        .bind(&code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(group_from_row))
    }

    /// Whether another group already uses `name` (case-insensitive).
    pub async fn group_name_taken(
        &self,
        name: &str,
        exclude_id: Option<&str>,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM music_groups WHERE name = ? COLLATE NOCASE AND id != ?",
        )
        .bind(name.trim())
        .bind(exclude_id.unwrap_or(""))
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.get("n");
        Ok(n > 0)
    }

    /// Create a group led by `leader_id`, who also becomes its first member.
    pub async fn create_group(
        &self,
        req: &CreateGroupRequest,
        leader_id: &str,
    ) -> Result<Group, AppError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Group name is required".to_string()));
        }
        if self.group_name_taken(name, None).await? {
            return Err(AppError::Validation(format!(
                "A group named {} already exists",
                name
            )));
        }

        let now = Utc::now().to_rfc3339();
        let group = Group {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: generate_group_id(),
            name: name.to_string(),
            description: req.description.clone(),
            church: req.church.clone(),
            invitation_code: Some(generate_invitation_code()),
            invitation_enabled: true,
            leader: leader_id.to_string(),
            moderators: Vec::new(),
            members: vec![leader_id.to_string()],
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };

        sqlx::query(
            r#"
            INSERT INTO music_groups (id, group_code, name, description, church, invitation_code,
                invitation_enabled, leader_id, moderators, members, created_at, updated_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&group.id)
        .bind(&group.group_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.church)
        .bind(&group.invitation_code)
        .bind(group.invitation_enabled)
        .bind(&group.leader)
        .bind(to_json(&group.moderators)?)
        .bind(to_json(&group.members)?)
        .bind(&group.created_at)
        .bind(&group.updated_at)
        .bind(group.version)
        .execute(&self.pool)
        .await?;

        Ok(group)
    }

    /// Load a group, apply `f` and write it back if nobody changed it meanwhile.
    pub async fn modify_group<T, F>(
        &self,
        id: &str,
        expected_version: Option<i64>,
        f: F,
    ) -> Result<(Group, T), AppError>
    where
        F: FnOnce(&mut Group) -> Result<T, AppError> + Send,
        T: Send,
    {
        let mut group = self
            .get_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))?;
        check_expected_version(expected_version, group.version)?;

        let out = f(&mut group)?;
        let previous = group.version;
        group.version += 1;
        group.updated_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE music_groups SET name = ?, description = ?, church = ?, invitation_code = ?,
                invitation_enabled = ?, leader_id = ?, moderators = ?, members = ?,
                updated_at = ?, version = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&group.name)
        .bind(&group.description)
        .bind(&group.church)
        .bind(&group.invitation_code)
        .bind(group.invitation_enabled)
        .bind(&group.leader)
        .bind(to_json(&group.moderators)?)
        .bind(to_json(&group.members)?)
        .bind(&group.updated_at)
        .bind(group.version)
        .bind(id)
        .bind(previous)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(concurrent_modification(previous));
        }

        Ok((group, out))
    }

    /// Delete a group. Returns whether a row was removed.
    pub async fn delete_group(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM music_groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn group_from_row(row: &sqlx::sqlite::SqliteRow) -> Group {
    let moderators: String = row.get("moderators");
    let members: String = row.get("members");
    Group {
        id: row.get("id"),
        group_id: row.get("group_code"),
        name: row.get("name"),
        description: row.get("description"),
        church: row.get("church"),
        invitation_code: row.get("invitation_code"),
        invitation_enabled: row.get("invitation_enabled"),
        leader: row.get("leader_id"),
        moderators: parse_json(&moderators),
        members: parse_json(&members),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}
