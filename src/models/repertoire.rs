//! Repertoire model: versions, per-version song modifications and ordering.
//!
//! A repertoire holds one base song list shared by all of its versions. Each
//! version may override lyrics, chords and notes per song and may assign an
//! explicit display position. Songs without an override use the base song.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{EntityRef, MediaLink};
use crate::errors::AppError;

/// Name given to the version created together with a repertoire.
pub const DEFAULT_VERSION_NAME: &str = "Original";

/// Occasion a repertoire is prepared for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepertoireCategory {
    #[default]
    Sunday,
    Youth,
    Prayer,
    Special,
    Wedding,
    Funeral,
    Other,
}

impl RepertoireCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepertoireCategory::Sunday => "sunday",
            RepertoireCategory::Youth => "youth",
            RepertoireCategory::Prayer => "prayer",
            RepertoireCategory::Special => "special",
            RepertoireCategory::Wedding => "wedding",
            RepertoireCategory::Funeral => "funeral",
            RepertoireCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "sunday" => Some(RepertoireCategory::Sunday),
            "youth" => Some(RepertoireCategory::Youth),
            "prayer" => Some(RepertoireCategory::Prayer),
            "special" => Some(RepertoireCategory::Special),
            "wedding" => Some(RepertoireCategory::Wedding),
            "funeral" => Some(RepertoireCategory::Funeral),
            "other" => Some(RepertoireCategory::Other),
            _ => None,
        }
    }
}

/// Per-version override record for one song.
///
/// `modified_lyrics: Some("")` means intentionally blank lyrics for this
/// version, which is not the same as `None` (inherit the base lyrics).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SongModification {
    pub song: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_lyrics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_chords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

/// One arrangement of a repertoire's song list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub song_modifications: Vec<SongModification>,
    /// Verbatim text last saved from the bulk lyric editor.
    ///
    /// Only present while it agrees with the per-song lyrics; any per-song
    /// lyric write clears it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lyrics_draft: Option<String>,
}

impl Version {
    pub fn new(name: String, notes: String, song_modifications: Vec<SongModification>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            notes,
            created_at: Utc::now(),
            song_modifications,
            lyrics_draft: None,
        }
    }

    pub fn modification(&self, song_id: &str) -> Option<&SongModification> {
        self.song_modifications.iter().find(|m| m.song == song_id)
    }

    /// Insert or update the modification for `song_id`.
    ///
    /// With `position` set only the position is written (reorder mode);
    /// otherwise only the supplied content fields are written (content mode).
    pub fn upsert_song_modification(
        &mut self,
        song_id: &str,
        request: &SongModificationRequest,
    ) -> SongModification {
        let index = self
            .song_modifications
            .iter()
            .position(|m| m.song == song_id);

        let index = match request.position {
            Some(position) => {
                let i = match index {
                    Some(i) => i,
                    None => {
                        self.song_modifications.push(SongModification {
                            song: song_id.to_string(),
                            ..Default::default()
                        });
                        self.song_modifications.len() - 1
                    }
                };
                // Draft sections are numbered in display order.
                if self.song_modifications[i].position != Some(position) {
                    self.song_modifications[i].position = Some(position);
                    self.lyrics_draft = None;
                }
                i
            }
            None => {
                let i = match index {
                    Some(i) => i,
                    None => {
                        self.song_modifications.push(SongModification {
                            song: song_id.to_string(),
                            ..Default::default()
                        });
                        self.song_modifications.len() - 1
                    }
                };
                let entry = &mut self.song_modifications[i];
                if let Some(lyrics) = &request.modified_lyrics {
                    entry.modified_lyrics = Some(lyrics.clone());
                }
                if let Some(chords) = &request.modified_chords {
                    entry.modified_chords = Some(chords.clone());
                }
                if let Some(notes) = &request.notes {
                    entry.notes = Some(notes.clone());
                }
                if request.modified_lyrics.is_some() {
                    self.lyrics_draft = None;
                }
                i
            }
        };

        self.song_modifications[index].clone()
    }

    /// Drop the override for `song_id`. Returns false when there was none.
    pub fn remove_song_modification(&mut self, song_id: &str) -> bool {
        let before = self.song_modifications.len();
        self.song_modifications.retain(|m| m.song != song_id);
        let removed = self.song_modifications.len() != before;
        if removed {
            self.lyrics_draft = None;
        }
        removed
    }
}

/// Coerce any JSON value supplied as lyrics into a string.
///
/// Strings pass through, `null` becomes an explicit blank, everything else
/// is rendered as its JSON text.
fn lyrics_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(Some(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }))
}

/// Request body for a single song modification upsert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongModificationRequest {
    #[serde(default, deserialize_with = "lyrics_as_string")]
    pub modified_lyrics: Option<String>,
    #[serde(default)]
    pub modified_chords: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

/// One item of a batch modification request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSongModification {
    pub song: EntityRef,
    #[serde(flatten)]
    pub changes: SongModificationRequest,
}

/// Request body for applying several modifications in one write.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSongModificationsRequest {
    pub modifications: Vec<BatchSongModification>,
}

/// Request body for assigning positions from an explicit order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderSongsRequest {
    pub song_ids: Vec<EntityRef>,
}

/// A performance of a repertoire; unlike songs, this history is not capped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepertoirePlay {
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    pub version_index: usize,
}

/// A named setlist owned by a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repertoire {
    pub id: String,
    pub group_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: RepertoireCategory,
    /// Base song list, shared by every version.
    #[serde(default)]
    pub songs: Vec<String>,
    pub versions: Vec<Version>,
    #[serde(default)]
    pub play_history: Vec<RepertoirePlay>,
    #[serde(default)]
    pub media_links: Vec<MediaLink>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Repertoire {
    fn version_index(&self, version_id: &str) -> Result<usize, AppError> {
        self.versions
            .iter()
            .position(|v| v.id == version_id)
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))
    }

    pub fn find_version(&self, version_id: &str) -> Result<&Version, AppError> {
        let i = self.version_index(version_id)?;
        Ok(&self.versions[i])
    }

    fn find_version_mut(&mut self, version_id: &str) -> Result<&mut Version, AppError> {
        let i = self.version_index(version_id)?;
        Ok(&mut self.versions[i])
    }

    fn ensure_song_listed(&self, song_id: &str) -> Result<(), AppError> {
        if self.songs.iter().any(|s| s == song_id) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "Song {} is not part of this repertoire",
                song_id
            )))
        }
    }

    pub fn add_version(
        &mut self,
        name: &str,
        notes: Option<String>,
        modifications: Vec<SongModification>,
    ) -> Result<&Version, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Version name is required".to_string()));
        }
        for m in &modifications {
            self.ensure_song_listed(&m.song)?;
        }
        self.versions.push(Version::new(
            name.to_string(),
            notes.unwrap_or_default(),
            dedupe_modifications(modifications),
        ));
        Ok(&self.versions[self.versions.len() - 1])
    }

    pub fn update_version(
        &mut self,
        version_id: &str,
        name: Option<&str>,
        notes: Option<&str>,
    ) -> Result<&Version, AppError> {
        let name = match name.map(str::trim) {
            Some("") => {
                return Err(AppError::Validation(
                    "Version name cannot be empty".to_string(),
                ))
            }
            other => other,
        };
        let version = self.find_version_mut(version_id)?;
        if let Some(name) = name {
            version.name = name.to_string();
        }
        if let Some(notes) = notes {
            version.notes = notes.to_string();
        }
        Ok(&*version)
    }

    /// Remove a version. The last remaining version can never be deleted.
    pub fn delete_version(&mut self, version_id: &str) -> Result<(), AppError> {
        let index = self.version_index(version_id)?;
        if self.versions.len() <= 1 {
            return Err(AppError::Validation(
                "Cannot delete the only version of a repertoire".to_string(),
            ));
        }
        self.versions.remove(index);
        Ok(())
    }

    pub fn upsert_song_modification(
        &mut self,
        version_id: &str,
        song_id: &str,
        request: &SongModificationRequest,
    ) -> Result<SongModification, AppError> {
        let index = self.version_index(version_id)?;
        self.ensure_song_listed(song_id)?;
        Ok(self.versions[index].upsert_song_modification(song_id, request))
    }

    /// Apply a list of upserts to one version. Nothing is applied unless every item is valid.
    pub fn apply_song_modifications(
        &mut self,
        version_id: &str,
        items: &[(String, SongModificationRequest)],
    ) -> Result<Vec<SongModification>, AppError> {
        self.version_index(version_id)?;
        for (song_id, _) in items {
            self.ensure_song_listed(song_id)?;
        }
        let version = self.find_version_mut(version_id)?;
        Ok(items
            .iter()
            .map(|(song_id, request)| version.upsert_song_modification(song_id, request))
            .collect())
    }

    /// Assign positions 0..n following `song_ids`.
    ///
    /// Songs left out of `song_ids` lose any earlier position and follow
    /// the listed ones in base-list order.
    pub fn reorder_songs(
        &mut self,
        version_id: &str,
        song_ids: &[String],
    ) -> Result<Vec<SongModification>, AppError> {
        let items: Vec<(String, SongModificationRequest)> = song_ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                (
                    id.clone(),
                    SongModificationRequest {
                        position: Some(i as i64),
                        ..Default::default()
                    },
                )
            })
            .collect();
        let modifications = self.apply_song_modifications(version_id, &items)?;

        let version = self.find_version_mut(version_id)?;
        let mut unpositioned = false;
        for m in &mut version.song_modifications {
            if m.position.is_some() && !song_ids.contains(&m.song) {
                m.position = None;
                unpositioned = true;
            }
        }
        if unpositioned {
            version.lyrics_draft = None;
        }
        Ok(modifications)
    }

    pub fn remove_song_modification(
        &mut self,
        version_id: &str,
        song_id: &str,
    ) -> Result<(), AppError> {
        let version = self.find_version_mut(version_id)?;
        if version.remove_song_modification(song_id) {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "No modification for song {} in version {}",
                song_id, version_id
            )))
        }
    }

    /// Store lyrics parsed from the bulk editor and keep `text` as the version's draft.
    pub fn save_bulk_lyrics(
        &mut self,
        version_id: &str,
        lyrics: Vec<(String, String)>,
        text: String,
    ) -> Result<(), AppError> {
        let items: Vec<(String, SongModificationRequest)> = lyrics
            .into_iter()
            .map(|(song_id, text)| {
                (
                    song_id,
                    SongModificationRequest {
                        modified_lyrics: Some(text),
                        ..Default::default()
                    },
                )
            })
            .collect();
        self.apply_song_modifications(version_id, &items)?;
        self.find_version_mut(version_id)?.lyrics_draft = Some(text);
        Ok(())
    }

    /// Replace the base song list. Overrides for songs no longer listed are dropped.
    ///
    /// Any change to the list invalidates every version's lyrics draft.
    pub fn set_songs(&mut self, songs: Vec<String>) {
        if songs == self.songs {
            return;
        }
        for version in &mut self.versions {
            version
                .song_modifications
                .retain(|m| songs.iter().any(|s| *s == m.song));
            version.lyrics_draft = None;
        }
        self.songs = songs;
    }

    /// Base song ids in display order for the version at `version_index`.
    ///
    /// Songs with an explicit position come first, sorted by it; the rest
    /// follow in base-list order. An unknown index yields the base order.
    pub fn ordered_song_ids(&self, version_index: usize) -> Vec<String> {
        let positions: HashMap<&str, i64> = self
            .versions
            .get(version_index)
            .map(|v| {
                v.song_modifications
                    .iter()
                    .filter_map(|m| m.position.map(|p| (m.song.as_str(), p)))
                    .collect()
            })
            .unwrap_or_default();

        let mut ordered = self.songs.clone();
        ordered.sort_by_key(|id| match positions.get(id.as_str()) {
            Some(p) => (false, *p),
            None => (true, 0),
        });
        ordered
    }

    pub fn record_play(
        &mut self,
        date: DateTime<Utc>,
        notes: Option<String>,
        event: Option<String>,
        version_index: usize,
    ) -> Result<&RepertoirePlay, AppError> {
        if version_index >= self.versions.len() {
            return Err(AppError::Validation(format!(
                "Version index {} out of range ({} versions)",
                version_index,
                self.versions.len()
            )));
        }
        self.play_history.push(RepertoirePlay {
            date,
            notes,
            event,
            version_index,
        });
        Ok(&self.play_history[self.play_history.len() - 1])
    }
}

/// Keep the last entry per song so the (version, song) pair stays unique.
pub fn dedupe_modifications(modifications: Vec<SongModification>) -> Vec<SongModification> {
    let mut out: Vec<SongModification> = Vec::with_capacity(modifications.len());
    for m in modifications {
        match out.iter_mut().find(|existing| existing.song == m.song) {
            Some(existing) => *existing = m,
            None => out.push(m),
        }
    }
    out
}

/// Modification as supplied by clients when creating a version.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongModificationInput {
    pub song: EntityRef,
    #[serde(default, deserialize_with = "lyrics_as_string")]
    pub modified_lyrics: Option<String>,
    #[serde(default)]
    pub modified_chords: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl From<SongModificationInput> for SongModification {
    fn from(input: SongModificationInput) -> Self {
        Self {
            song: input.song.into_inner(),
            modified_lyrics: input.modified_lyrics,
            modified_chords: input.modified_chords,
            notes: input.notes,
            position: input.position,
        }
    }
}

/// Request body for creating a new repertoire.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRepertoireRequest {
    pub name: String,
    pub group_id: EntityRef,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<RepertoireCategory>,
    #[serde(default)]
    pub songs: Vec<EntityRef>,
    /// Modifications for the initial version.
    #[serde(default)]
    pub song_modifications: Vec<SongModificationInput>,
}

/// Request body for updating an existing repertoire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRepertoireRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<RepertoireCategory>,
    #[serde(default)]
    pub songs: Option<Vec<EntityRef>>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

/// Request body for adding a version.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub song_modifications: Vec<SongModificationInput>,
}

/// Request body for renaming or annotating a version.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVersionRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Aggregate statistics for a group's repertoires.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RepertoireStats {
    pub total_repertoires: usize,
    pub by_category: BTreeMap<String, usize>,
    pub total_performances: usize,
    pub total_versions: usize,
    pub last_performed: Option<DateTime<Utc>>,
}

pub fn repertoire_stats(repertoires: &[Repertoire]) -> RepertoireStats {
    let mut by_category = BTreeMap::new();
    for r in repertoires {
        *by_category
            .entry(r.category.as_str().to_string())
            .or_insert(0) += 1;
    }
    RepertoireStats {
        total_repertoires: repertoires.len(),
        by_category,
        total_performances: repertoires.iter().map(|r| r.play_history.len()).sum(),
        total_versions: repertoires.iter().map(|r| r.versions.len()).sum(),
        last_performed: repertoires
            .iter()
            .flat_map(|r| r.play_history.iter().map(|p| p.date))
            .max(),
    }
}
