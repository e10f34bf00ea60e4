//! Song persistence.

use chrono::Utc;
use sqlx::Row;

use super::repository::{check_expected_version, concurrent_modification, parse_json, to_json};
use super::Repository;
use crate::errors::AppError;
use crate::models::{
    normalize_tags, trim_play_history, CreateSongRequest, Song, SongCategory,
};

const SONG_COLUMNS: &str = "id, group_id, title, lyrics, chords, author, category, tags, \
    song_key, tempo, media_links, play_history, created_by, created_at, updated_at, version";

/// Outcome of a play-history trimming pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrimReport {
    pub songs_examined: usize,
    pub songs_trimmed: usize,
    pub entries_removed: usize,
}

impl Repository {
    /// List songs, optionally restricted to one group and category, ordered by title.
    pub async fn list_songs(
        &self,
        group_id: Option<&str>,
        category: Option<SongCategory>,
    ) -> Result<Vec<Song>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM songs \
             WHERE (?1 IS NULL OR group_id = ?1) AND (?2 IS NULL OR category = ?2) \
             ORDER BY title COLLATE NOCASE",
            SONG_COLUMNS
        ))
        .bind(group_id)
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(song_from_row).collect())
    }

    pub async fn get_song(&self, id: &str) -> Result<Option<Song>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM songs WHERE id = ?", SONG_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(song_from_row))
    }

    /// Fetch several songs at once. Unknown ids are silently skipped.
    pub async fn get_songs_by_ids(&self, ids: &[String]) -> Result<Vec<Song>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM songs WHERE id IN (SELECT value FROM json_each(?))",
            SONG_COLUMNS
        ))
        .bind(to_json(&ids)?)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(song_from_row).collect())
    }

    pub async fn create_song(
        &self,
        req: &CreateSongRequest,
        created_by: &str,
    ) -> Result<Song, AppError> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let song = Song {
            id: uuid::Uuid::new_v4().to_string(),
            group_id: req.group_id.as_str().to_string(),
            title: title.to_string(),
            lyrics: req.lyrics.clone().unwrap_or_default(),
            chords: req.chords.clone(),
            author: req.author.clone(),
            category: req.category.unwrap_or_default(),
            tags: normalize_tags(req.tags.clone().unwrap_or_default()),
            key: req.key.clone(),
            tempo: req.tempo,
            media_links: Vec::new(),
            play_history: Vec::new(),
            created_by: created_by.to_string(),
            created_at: now.clone(),
            updated_at: now,
            version: 1,
        };

        sqlx::query(
            r#"
            INSERT INTO songs (id, group_id, title, lyrics, chords, author, category, tags,
                song_key, tempo, media_links, play_history, created_by, created_at, updated_at, version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&song.id)
        .bind(&song.group_id)
        .bind(&song.title)
        .bind(&song.lyrics)
        .bind(&song.chords)
        .bind(&song.author)
        .bind(song.category.as_str())
        .bind(to_json(&song.tags)?)
        .bind(&song.key)
        .bind(song.tempo)
        .bind(to_json(&song.media_links)?)
        .bind(to_json(&song.play_history)?)
        .bind(&song.created_by)
        .bind(&song.created_at)
        .bind(&song.updated_at)
        .bind(song.version)
        .execute(&self.pool)
        .await?;

        Ok(song)
    }

    /// Load a song, apply `f` and write it back if nobody changed it meanwhile.
    pub async fn modify_song<T, F>(
        &self,
        id: &str,
        expected_version: Option<i64>,
        f: F,
    ) -> Result<(Song, T), AppError>
    where
        F: FnOnce(&mut Song) -> Result<T, AppError> + Send,
        T: Send,
    {
        let mut song = self
            .get_song(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Song {} not found", id)))?;
        check_expected_version(expected_version, song.version)?;

        let out = f(&mut song)?;
        let previous = song.version;
        song.version += 1;
        song.updated_at = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE songs SET title = ?, lyrics = ?, chords = ?, author = ?, category = ?, tags = ?,
                song_key = ?, tempo = ?, media_links = ?, play_history = ?, updated_at = ?, version = ?
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(&song.title)
        .bind(&song.lyrics)
        .bind(&song.chords)
        .bind(&song.author)
        .bind(song.category.as_str())
        .bind(to_json(&song.tags)?)
        .bind(&song.key)
        .bind(song.tempo)
        .bind(to_json(&song.media_links)?)
        .bind(to_json(&song.play_history)?)
        .bind(&song.updated_at)
        .bind(song.version)
        .bind(id)
        .bind(previous)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(concurrent_modification(previous));
        }

        Ok((song, out))
    }

    /// Delete a song. Returns whether a row was removed.
    pub async fn delete_song(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Cut every song's play history down to the newest `keep` entries.
    ///
    /// All rewrites happen in one transaction. With `dry_run` nothing is written.
    pub async fn trim_song_histories(
        &self,
        keep: usize,
        dry_run: bool,
    ) -> Result<TrimReport, AppError> {
        let songs = self.list_songs(None, None).await?;
        let mut report = TrimReport {
            songs_examined: songs.len(),
            ..Default::default()
        };

        let mut tx = self.pool.begin().await?;
        for mut song in songs {
            let removed = trim_play_history(&mut song.play_history, keep);
            if removed == 0 {
                continue;
            }
            report.songs_trimmed += 1;
            report.entries_removed += removed;
            tracing::debug!(song_id = %song.id, removed, "Trimming play history");

            if !dry_run {
                sqlx::query(
                    "UPDATE songs SET play_history = ?, version = version + 1 WHERE id = ?",
                )
                .bind(to_json(&song.play_history)?)
                .bind(&song.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }

        Ok(report)
    }
}

fn song_from_row(row: &sqlx::sqlite::SqliteRow) -> Song {
    let category: String = row.get("category");
    let tags: String = row.get("tags");
    let media_links: String = row.get("media_links");
    let play_history: String = row.get("play_history");
    Song {
        id: row.get("id"),
        group_id: row.get("group_id"),
        title: row.get("title"),
        lyrics: row.get("lyrics"),
        chords: row.get("chords"),
        author: row.get("author"),
        category: SongCategory::from_str(&category).unwrap_or_default(),
        tags: parse_json(&tags),
        key: row.get("song_key"),
        tempo: row.get("tempo"),
        media_links: parse_json(&media_links),
        play_history: parse_json(&play_history),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        version: row.get("version"),
    }
}
