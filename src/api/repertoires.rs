//! Repertoire API endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{created, require_member, success, ApiResponse, ApiResult};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{
    normalize_refs, remove_link, repertoire_stats, CreateMediaLinkRequest,
    CreateRepertoireRequest, MediaLink, RecordPlayRequest, Repertoire, RepertoireCategory,
    RepertoirePlay, RepertoireStats, Song, SongModification, UpdateRepertoireRequest,
};
use crate::AppState;

/// Query parameters for listing repertoires.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepertoireListQuery {
    pub group_id: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetQuery {
    pub version_index: Option<usize>,
}

/// Printable view of one version of a repertoire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepertoireSheet {
    pub repertoire_id: String,
    pub name: String,
    pub date: Option<String>,
    pub version_index: usize,
    pub version_name: String,
    pub version_notes: String,
    pub songs: Vec<SheetSong>,
}

/// A song as it is performed in a given version.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetSong {
    /// 1-based position in display order
    pub number: usize,
    pub song_id: String,
    pub title: String,
    pub author: Option<String>,
    pub key: Option<String>,
    pub lyrics: String,
    pub chords: Option<String>,
    pub notes: Option<String>,
    pub modified: bool,
}

/// A listed song paired with its override in one version.
pub(crate) struct OrderedSong<'a> {
    pub song: &'a Song,
    pub modification: Option<&'a SongModification>,
}

impl OrderedSong<'_> {
    /// Version lyrics when overridden, even when blank; base lyrics otherwise.
    pub fn effective_lyrics(&self) -> &str {
        self.modification
            .and_then(|m| m.modified_lyrics.as_deref())
            .unwrap_or(&self.song.lyrics)
    }

    pub fn effective_chords(&self) -> Option<&str> {
        self.modification
            .and_then(|m| m.modified_chords.as_deref())
            .or(self.song.chords.as_deref())
    }
}

/// Songs of the version at `version_index` in display order.
///
/// Listed ids that no longer resolve to a song are skipped.
pub(crate) fn ordered_songs<'a>(
    repertoire: &'a Repertoire,
    version_index: usize,
    songs: &'a [Song],
) -> Vec<OrderedSong<'a>> {
    let by_id: HashMap<&str, &Song> = songs.iter().map(|s| (s.id.as_str(), s)).collect();
    let version = repertoire.versions.get(version_index);
    repertoire
        .ordered_song_ids(version_index)
        .iter()
        .filter_map(|id| {
            by_id.get(id.as_str()).map(|song| OrderedSong {
                song: *song,
                modification: version.and_then(|v| v.modification(id)),
            })
        })
        .collect()
}

pub(crate) fn parse_repertoire_category(
    raw: Option<&str>,
) -> Result<Option<RepertoireCategory>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => RepertoireCategory::from_str(&s.to_lowercase())
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("Unknown repertoire category: {}", s))),
    }
}

pub(crate) async fn load_repertoire(state: &AppState, id: &str) -> Result<Repertoire, AppError> {
    state
        .repo
        .get_repertoire(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Repertoire {} not found", id)))
}

/// Load a repertoire whose group the caller belongs to.
pub(crate) async fn load_repertoire_for_member(
    state: &AppState,
    id: &str,
    user: &AuthUser,
) -> Result<Repertoire, AppError> {
    let repertoire = load_repertoire(state, id).await?;
    require_member(state, &repertoire.group_id, user).await?;
    Ok(repertoire)
}

/// Reject song ids that are unknown or belong to another group.
async fn ensure_songs_in_group(
    state: &AppState,
    group_id: &str,
    song_ids: &[String],
) -> Result<(), AppError> {
    let found = state.repo.get_songs_by_ids(song_ids).await?;
    for id in song_ids {
        match found.iter().find(|s| &s.id == id) {
            Some(song) if song.group_id == group_id => {}
            Some(_) => {
                return Err(AppError::Validation(format!(
                    "Song {} belongs to another group",
                    id
                )))
            }
            None => return Err(AppError::Validation(format!("Song {} does not exist", id))),
        }
    }
    Ok(())
}

/// GET /api/repertoires - List repertoires.
pub async fn list_repertoires(
    State(state): State<AppState>,
    Query(query): Query<RepertoireListQuery>,
) -> ApiResult<Vec<Repertoire>> {
    let category = parse_repertoire_category(query.category.as_deref())?;
    success(
        state
            .repo
            .list_repertoires(query.group_id.as_deref(), category)
            .await?,
    )
}

/// GET /api/repertoires/:id - Get a single repertoire.
pub async fn get_repertoire(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Repertoire> {
    success(load_repertoire(&state, &id).await?)
}

/// POST /api/repertoires - Create a repertoire with its default version.
pub async fn create_repertoire(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateRepertoireRequest>,
) -> ApiResult<Repertoire> {
    let group_id = request.group_id.as_str().to_string();
    if group_id.is_empty() {
        return Err(AppError::Validation("groupId is required".to_string()));
    }
    require_member(&state, &group_id, &user).await?;
    ensure_songs_in_group(&state, &group_id, &normalize_refs(request.songs.clone())).await?;

    let repertoire = state.repo.create_repertoire(request, user.id()).await?;
    tracing::info!(repertoire_id = %repertoire.id, group_id = %group_id, "Created repertoire");

    created(repertoire)
}

/// PUT /api/repertoires/:id - Partially update a repertoire.
///
/// Replacing the song list drops overrides of removed songs in every version.
pub async fn update_repertoire(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateRepertoireRequest>,
) -> ApiResult<Repertoire> {
    let existing = load_repertoire_for_member(&state, &id, &user).await?;

    let songs = request.songs.map(normalize_refs);
    if let Some(songs) = &songs {
        ensure_songs_in_group(&state, &existing.group_id, songs).await?;
    }
    let name = match request.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("Name cannot be empty".to_string())),
        other => other.map(str::to_string),
    };

    let (repertoire, ()) = state
        .repo
        .modify_repertoire(&id, request.expected_version, |r| {
            if let Some(name) = name {
                r.name = name;
            }
            if let Some(date) = request.date {
                r.date = Some(date);
            }
            if let Some(description) = request.description {
                r.description = Some(description);
            }
            if let Some(category) = request.category {
                r.category = category;
            }
            if let Some(songs) = songs {
                r.set_songs(songs);
            }
            Ok(())
        })
        .await?;

    success(repertoire)
}

/// DELETE /api/repertoires/:id - Delete a repertoire.
pub async fn delete_repertoire(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    load_repertoire_for_member(&state, &id, &user).await?;
    if !state.repo.delete_repertoire(&id).await? {
        return Err(AppError::NotFound(format!("Repertoire {} not found", id)));
    }
    tracing::info!(repertoire_id = %id, "Deleted repertoire");
    Ok(ApiResponse::new(()).with_message("Repertoire deleted"))
}

/// POST /api/repertoires/:id/played - Record a performance of one version.
pub async fn record_repertoire_play(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<RecordPlayRequest>,
) -> ApiResult<RepertoirePlay> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let date = request.date.unwrap_or_else(Utc::now);
    let version_index = request.version_index.unwrap_or(0);
    let (_, play) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.record_play(date, request.notes, request.event, version_index)
                .cloned()
        })
        .await?;

    created(play)
}

/// POST /api/repertoires/:id/media - Attach a media link.
pub async fn add_repertoire_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CreateMediaLinkRequest>,
) -> ApiResult<MediaLink> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let link = request.into_link().map_err(AppError::Validation)?;
    let (_, link) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.media_links.push(link.clone());
            Ok(link)
        })
        .await?;

    created(link)
}

/// DELETE /api/repertoires/:id/media/:link_id - Remove a media link.
pub async fn remove_repertoire_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, link_id)): Path<(String, String)>,
) -> ApiResult<Repertoire> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let (repertoire, ()) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            if remove_link(&mut r.media_links, &link_id) {
                Ok(())
            } else {
                Err(AppError::NotFound(format!(
                    "Media link {} not found",
                    link_id
                )))
            }
        })
        .await?;

    success(repertoire)
}

/// GET /api/repertoires/stats/group/:group_id - Repertoire statistics for a group.
pub async fn repertoire_group_stats(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> ApiResult<RepertoireStats> {
    let repertoires = state.repo.list_repertoires(Some(&group_id), None).await?;
    success(repertoire_stats(&repertoires))
}

/// GET /api/repertoires/:id/sheet?versionIndex=N - Effective songs of one version.
pub async fn repertoire_sheet(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<SheetQuery>,
) -> ApiResult<RepertoireSheet> {
    let repertoire = load_repertoire(&state, &id).await?;
    let version_index = query.version_index.unwrap_or(0);
    let version = repertoire.versions.get(version_index).ok_or_else(|| {
        AppError::NotFound(format!("Version index {} not found", version_index))
    })?;

    let songs = state.repo.get_songs_by_ids(&repertoire.songs).await?;
    let sheet_songs = ordered_songs(&repertoire, version_index, &songs)
        .iter()
        .enumerate()
        .map(|(i, entry)| SheetSong {
            number: i + 1,
            song_id: entry.song.id.clone(),
            title: entry.song.title.clone(),
            author: entry.song.author.clone(),
            key: entry.song.key.clone(),
            lyrics: entry.effective_lyrics().to_string(),
            chords: entry.effective_chords().map(str::to_string),
            notes: entry.modification.and_then(|m| m.notes.clone()),
            modified: entry.modification.is_some(),
        })
        .collect();

    success(RepertoireSheet {
        repertoire_id: repertoire.id.clone(),
        name: repertoire.name.clone(),
        date: repertoire.date.clone(),
        version_index,
        version_name: version.name.clone(),
        version_notes: version.notes.clone(),
        songs: sheet_songs,
    })
}
