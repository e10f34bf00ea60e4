//! Song API endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{created, require_member, success, ApiResult};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{
    remove_link, song_stats, CreateMediaLinkRequest, CreateSongRequest, MediaLink,
    RecordPlayRequest, Song, SongCategory, SongResponse, SongStats, UpdateSongRequest,
};
use crate::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const MAX_SEARCH_LIMIT: usize = 100;

/// Query parameters for listing songs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongListQuery {
    pub group_id: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
}

/// Query parameters for full-text search.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongSearchQuery {
    #[serde(default)]
    pub q: String,
    pub group_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// A song matched by full-text search.
#[derive(Debug, Serialize)]
pub struct SongSearchHit {
    pub score: f32,
    #[serde(flatten)]
    pub song: SongResponse,
}

pub(crate) fn parse_song_category(raw: Option<&str>) -> Result<Option<SongCategory>, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => SongCategory::from_str(&s.to_lowercase())
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("Unknown song category: {}", s))),
    }
}

fn matches_filters(song: &Song, tag: Option<&str>, search: Option<&str>) -> bool {
    if let Some(tag) = tag {
        if !song.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            return false;
        }
    }
    if let Some(needle) = search {
        let needle = needle.to_lowercase();
        let in_title = song.title.to_lowercase().contains(&needle);
        let in_author = song
            .author
            .as_deref()
            .is_some_and(|a| a.to_lowercase().contains(&needle));
        if !(in_title || in_author) {
            return false;
        }
    }
    true
}

async fn load_song(state: &AppState, id: &str) -> Result<Song, AppError> {
    state
        .repo
        .get_song(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Song {} not found", id)))
}

/// Re-index a song. Index failures do not fail the request.
async fn reindex(state: &AppState, song: &Song) {
    if let Err(e) = state.search.index_song(song).await {
        tracing::warn!("Failed to index song {}: {}", song.id, e);
    }
}

/// GET /api/songs - List songs with optional filters.
pub async fn list_songs(
    State(state): State<AppState>,
    Query(query): Query<SongListQuery>,
) -> ApiResult<Vec<SongResponse>> {
    let category = parse_song_category(query.category.as_deref())?;
    let tag = query.tag.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let songs = state
        .repo
        .list_songs(query.group_id.as_deref(), category)
        .await?;

    success(
        songs
            .into_iter()
            .filter(|s| matches_filters(s, tag, search))
            .map(SongResponse::from)
            .collect(),
    )
}

/// GET /api/songs/search - Full-text search over title, tags, author and lyrics.
pub async fn search_songs(
    State(state): State<AppState>,
    Query(query): Query<SongSearchQuery>,
) -> ApiResult<Vec<SongSearchHit>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let offset = query.offset.unwrap_or(0);

    let results = state
        .search
        .search(&query.q, query.group_id.as_deref(), limit, offset)?;
    let ids: Vec<String> = results.iter().map(|r| r.song_id.clone()).collect();

    let mut songs: HashMap<String, Song> = state
        .repo
        .get_songs_by_ids(&ids)
        .await?
        .into_iter()
        .map(|s| (s.id.clone(), s))
        .collect();

    // Keep relevance order; hits for songs deleted meanwhile are dropped.
    let hits = results
        .into_iter()
        .filter_map(|r| {
            songs.remove(&r.song_id).map(|song| SongSearchHit {
                score: r.score,
                song: song.into(),
            })
        })
        .collect();

    success(hits)
}

/// GET /api/songs/:id - Get a single song.
pub async fn get_song(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SongResponse> {
    success(load_song(&state, &id).await?.into())
}

/// POST /api/songs - Create a song in a group the caller belongs to.
pub async fn create_song(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateSongRequest>,
) -> ApiResult<SongResponse> {
    if request.group_id.as_str().is_empty() {
        return Err(AppError::Validation("groupId is required".to_string()));
    }
    require_member(&state, request.group_id.as_str(), &user).await?;

    let song = state.repo.create_song(&request, user.id()).await?;
    tracing::info!(song_id = %song.id, group_id = %song.group_id, "Created song");
    reindex(&state, &song).await;

    created(song.into())
}

/// PUT /api/songs/:id - Partially update a song.
pub async fn update_song(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateSongRequest>,
) -> ApiResult<SongResponse> {
    let existing = load_song(&state, &id).await?;
    require_member(&state, &existing.group_id, &user).await?;

    let (song, ()) = state
        .repo
        .modify_song(&id, request.expected_version, |song| {
            request.apply(song).map_err(AppError::Validation)
        })
        .await?;
    reindex(&state, &song).await;

    success(song.into())
}

/// DELETE /api/songs/:id - Delete a song.
pub async fn delete_song(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let existing = load_song(&state, &id).await?;
    require_member(&state, &existing.group_id, &user).await?;

    if !state.repo.delete_song(&id).await? {
        return Err(AppError::NotFound(format!("Song {} not found", id)));
    }
    if let Err(e) = state.search.remove_song(&id).await {
        tracing::warn!("Failed to remove song from index: {}", e);
    }
    tracing::info!(song_id = %id, "Deleted song");

    Ok(super::ApiResponse::new(()).with_message("Song deleted"))
}

/// POST /api/songs/:id/played - Record a performance.
pub async fn record_song_play(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<RecordPlayRequest>,
) -> ApiResult<SongResponse> {
    let existing = load_song(&state, &id).await?;
    require_member(&state, &existing.group_id, &user).await?;

    let date = request.date.unwrap_or_else(Utc::now);
    let (song, ()) = state
        .repo
        .modify_song(&id, None, |song| {
            song.record_play(date, request.notes, request.event);
            Ok(())
        })
        .await?;

    created(song.into())
}

/// POST /api/songs/:id/media - Attach a media link.
pub async fn add_song_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CreateMediaLinkRequest>,
) -> ApiResult<MediaLink> {
    let existing = load_song(&state, &id).await?;
    require_member(&state, &existing.group_id, &user).await?;

    let link = request.into_link().map_err(AppError::Validation)?;
    let (_, link) = state
        .repo
        .modify_song(&id, None, |song| {
            song.media_links.push(link.clone());
            Ok(link)
        })
        .await?;

    created(link)
}

/// DELETE /api/songs/:id/media/:link_id - Remove a media link.
pub async fn remove_song_media(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, link_id)): Path<(String, String)>,
) -> ApiResult<SongResponse> {
    let existing = load_song(&state, &id).await?;
    require_member(&state, &existing.group_id, &user).await?;

    let (song, ()) = state
        .repo
        .modify_song(&id, None, |song| {
            if remove_link(&mut song.media_links, &link_id) {
                Ok(())
            } else {
                Err(AppError::NotFound(format!(
                    "Media link {} not found",
                    link_id
                )))
            }
        })
        .await?;

    success(song.into())
}

/// GET /api/songs/stats/group/:group_id - Catalogue statistics for a group.
pub async fn song_group_stats(
    State(state): State<AppState>,
    Path(group_id): Path<String>,
) -> ApiResult<SongStats> {
    let songs = state.repo.list_songs(Some(&group_id), None).await?;
    success(song_stats(&songs, Utc::now()))
}
