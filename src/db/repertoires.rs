//! Repertoire persistence.
//!
//! A repertoire row carries its versions, song modifications, play history
//! and media links as JSON, so every version edit is a single row write.

use chrono::Utc;
use sqlx::Row;

use super::repository::{
    check_expected_version, concurrent_modification, parse_json, parse_json_required, to_json,
};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    normalize_refs, CreateRepertoireRequest, Repertoire, RepertoireCategory, SongModification,
    Version, DEFAULT_VERSION_NAME,
};

const REPERTOIRE_COLUMNS: &str = "id, group_id, name, event_date, description, category, songs, \
    versions, play_history, media_links, created_by, created_at, updated_at, version";

impl Repository {
    /// List repertoires, newest event first.
    pub async fn list_repertoires(
        &self,
        group_id: Option<&str>,
        category: Option<RepertoireCategory>,
    ) -> Result<Vec<Repertoire>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM repertoires \
             WHERE (?1 IS NULL OR group_id = ?1) AND (?2 IS NULL OR category = ?2) \
             ORDER BY event_date DESC, created_at DESC",
            REPERTOIRE_COLUMNS
        ))
        .bind(group_id)
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(repertoire_from_row).collect()
    }

    pub async fn get_repertoire(&self, id: &str) -> Result<Option<Repertoire>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM repertoires WHERE id = ?",
            REPERTOIRE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(repertoire_from_row).transpose()
    }

    /// Create a repertoire with its default version.
    ///
    /// Callers check that the listed songs belong to the repertoire's group.
    pub async fn create_repertoire(
        &self,
        req: CreateRepertoireRequest,
        created_by: &str,
    ) -> Result<Repertoire, AppError> {
        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let mut repertoire = Repertoire {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: req.group_id.into_inner(),
            name,
            date: req.date,
            description: req.description,
            category: req.category.unwrap_or_default(),
            songs: normalize_refs(req.songs),
            versions: Vec::new(),
            play_history: Vec::new(),
            media_links: Vec::new(),
            created_by: created_by.to_string(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };
        let modifications: Vec<SongModification> =
            req.song_modifications.into_iter().map(Into::into).collect();
        repertoire.add_version(DEFAULT_VERSION_NAME, None, modifications)?;

        sqlx::query(
            r#"
            INSERT INTO repertoires (id, group_id, name, event_date, description, category, songs,
                versions, play_history, media_links, created_by, created_at, updated_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&repertoire.id)
        .bind(&repertoire.group_id)
        .bind(&repertoire.name)
        .bind(&repertoire.date)
        .bind(&repertoire.description)
        .bind(repertoire.category.as_str())
        .bind(to_json(&repertoire.songs)?)
        .bind(to_json(&repertoire.versions)?)
        .bind(to_json(&repertoire.play_history)?)
        .bind(to_json(&repertoire.media_links)?)
        .bind(&repertoire.created_by)
        .bind(&repertoire.created_at)
        .bind(&repertoire.updated_at)
        .bind(repertoire.version)
        .execute(&self.pool)
        .await?;

        Ok(repertoire)
    }

    /// Load a repertoire, apply `f` and write it back if nobody changed it meanwhile.
    ///
    /// When `f` fails nothing is written, which makes multi-item edits atomic.
    pub async fn modify_repertoire<T, F>(
        &self,
        id: &str,
        expected_version: Option<i64>,
        f: F,
    ) -> Result<(Repertoire, T), AppError>
    where
        F: FnOnce(&mut Repertoire) -> Result<T, AppError> + Send,
        T: Send,
    {
        let mut repertoire = self
            .get_repertoire(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Repertoire {} not found", id)))?;
        check_expected_version(expected_version, repertoire.version)?;

        let out = f(&mut repertoire)?;
        let previous = repertoire.version;
        repertoire.version += 1;
        repertoire.updated_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE repertoires SET name = ?, event_date = ?, description = ?, category = ?,
                songs = ?, versions = ?, play_history = ?, media_links = ?,
                updated_at = ?, version = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&repertoire.name)
        .bind(&repertoire.date)
        .bind(&repertoire.description)
        .bind(repertoire.category.as_str())
        .bind(to_json(&repertoire.songs)?)
        .bind(to_json(&repertoire.versions)?)
        .bind(to_json(&repertoire.play_history)?)
        .bind(to_json(&repertoire.media_links)?)
        .bind(&repertoire.updated_at)
        .bind(repertoire.version)
        .bind(id)
        .bind(previous)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(concurrent_modification(previous));
        }

        Ok((repertoire, out))
    }

    /// Delete a repertoire. Returns whether a row was removed.
    pub async fn delete_repertoire(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM repertoires WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Versions are decoded strictly: a repertoire without versions must never be written back.
fn repertoire_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Repertoire, AppError> {
    let category: String = row.get("category");
    let songs: String = row.get("songs");
    let versions: String = row.get("versions");
    let play_history: String = row.get("play_history");
    let media_links: String = row.get("media_links");
    let versions: Vec<Version> = parse_json_required(&versions, "versions")?;
    if versions.is_empty() {
        return Err(AppError::Internal("Stored versions are empty".to_string()));
    }
    Ok(Repertoire {
        id: row.get("id"),
        group_id: row.get("group_id"),
        name: row.get("name"),
        date: row.get("event_date"),
        description: row.get("description"),
        category: RepertoireCategory::from_str(&category).unwrap_or_default(),
        songs: parse_json(&songs),
        versions,
        play_history: parse_json(&play_history),
        media_links: parse_json(&media_links),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    })
}
