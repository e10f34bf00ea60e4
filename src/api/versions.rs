//! Repertoire version endpoints: versions, per-song modifications and the
//! bulk lyric editor.

use axum::{
    extract::{Path, State},
    Json,
};

use super::repertoires::{load_repertoire, load_repertoire_for_member, ordered_songs};
use super::{created, success, ApiResponse, ApiResult};
use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{
    compose_bulk_lyrics, normalize_refs, parse_bulk_lyrics, BatchSongModificationsRequest,
    BulkLyricsResponse, CreateVersionRequest, LyricSection, ReorderSongsRequest,
    SaveBulkLyricsRequest, SongModification, SongModificationRequest, UpdateVersionRequest,
    Version,
};
use crate::AppState;

/// GET /api/repertoires/:id/versions - List versions.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Version>> {
    success(load_repertoire(&state, &id).await?.versions)
}

/// POST /api/repertoires/:id/versions - Add a version.
pub async fn create_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CreateVersionRequest>,
) -> ApiResult<Version> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let modifications: Vec<SongModification> = request
        .song_modifications
        .into_iter()
        .map(Into::into)
        .collect();
    let (_, version) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.add_version(&request.name, request.notes, modifications)
                .cloned()
        })
        .await?;
    tracing::info!(repertoire_id = %id, version_id = %version.id, "Added version");

    created(version)
}

/// PUT /api/repertoires/:id/versions/:version_id - Rename or annotate a version.
pub async fn update_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id)): Path<(String, String)>,
    Json(request): Json<UpdateVersionRequest>,
) -> ApiResult<Version> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let (_, version) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.update_version(
                &version_id,
                request.name.as_deref(),
                request.notes.as_deref(),
            )
            .cloned()
        })
        .await?;

    success(version)
}

/// DELETE /api/repertoires/:id/versions/:version_id - Delete a version.
///
/// The last remaining version cannot be deleted.
pub async fn delete_version(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id)): Path<(String, String)>,
) -> ApiResult<Vec<Version>> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let (repertoire, ()) = state
        .repo
        .modify_repertoire(&id, None, |r| r.delete_version(&version_id))
        .await?;
    tracing::info!(repertoire_id = %id, version_id = %version_id, "Deleted version");

    Ok(ApiResponse::new(repertoire.versions).with_message("Version deleted"))
}

/// GET /api/repertoires/:id/versions/:version_id/songs - Modifications of a version.
pub async fn list_song_modifications(
    State(state): State<AppState>,
    Path((id, version_id)): Path<(String, String)>,
) -> ApiResult<Vec<SongModification>> {
    let repertoire = load_repertoire(&state, &id).await?;
    let version = repertoire.find_version(&version_id)?;
    success(version.song_modifications.clone())
}

/// PUT /api/repertoires/:id/versions/:version_id/songs/:song_id - Upsert one modification.
///
/// A request carrying `position` only moves the song; otherwise only the
/// supplied content fields are written.
pub async fn upsert_song_modification(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id, song_id)): Path<(String, String, String)>,
    Json(request): Json<SongModificationRequest>,
) -> ApiResult<SongModification> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let song_id = song_id.trim();
    let (_, modification) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.upsert_song_modification(&version_id, song_id, &request)
        })
        .await?;

    success(modification)
}

/// DELETE /api/repertoires/:id/versions/:version_id/songs/:song_id - Drop an override.
pub async fn remove_song_modification(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id, song_id)): Path<(String, String, String)>,
) -> ApiResult<Vec<SongModification>> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let (repertoire, ()) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.remove_song_modification(&version_id, song_id.trim())
        })
        .await?;

    let version = repertoire.find_version(&version_id)?;
    success(version.song_modifications.clone())
}

/// PUT /api/repertoires/:id/versions/:version_id/songs - Apply many upserts at once.
///
/// Either every modification is applied or none is.
pub async fn batch_song_modifications(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id)): Path<(String, String)>,
    Json(request): Json<BatchSongModificationsRequest>,
) -> ApiResult<Vec<SongModification>> {
    load_repertoire_for_member(&state, &id, &user).await?;

    if request.modifications.is_empty() {
        return Err(AppError::Validation(
            "No modifications provided".to_string(),
        ));
    }
    let items: Vec<(String, SongModificationRequest)> = request
        .modifications
        .into_iter()
        .map(|m| (m.song.into_inner(), m.changes))
        .collect();

    let (_, modifications) = state
        .repo
        .modify_repertoire(&id, None, |r| {
            r.apply_song_modifications(&version_id, &items)
        })
        .await?;
    tracing::debug!(repertoire_id = %id, count = modifications.len(), "Applied batch modifications");

    success(modifications)
}

/// PUT /api/repertoires/:id/versions/:version_id/reorder - Set display order.
pub async fn reorder_songs(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id)): Path<(String, String)>,
    Json(request): Json<ReorderSongsRequest>,
) -> ApiResult<Vec<String>> {
    load_repertoire_for_member(&state, &id, &user).await?;

    let song_ids = normalize_refs(request.song_ids);
    let (repertoire, _) = state
        .repo
        .modify_repertoire(&id, None, |r| r.reorder_songs(&version_id, &song_ids))
        .await?;

    let index = repertoire
        .versions
        .iter()
        .position(|v| v.id == version_id)
        .unwrap_or_default();
    success(repertoire.ordered_song_ids(index))
}

/// GET /api/repertoires/:id/versions/:version_id/lyrics - Bulk editor text.
///
/// Returns the saved draft verbatim while it is current, otherwise builds
/// the text from each song's effective lyrics in display order.
pub async fn get_bulk_lyrics(
    State(state): State<AppState>,
    Path((id, version_id)): Path<(String, String)>,
) -> ApiResult<BulkLyricsResponse> {
    let repertoire = load_repertoire(&state, &id).await?;
    let version = repertoire.find_version(&version_id)?;

    if let Some(draft) = &version.lyrics_draft {
        return success(BulkLyricsResponse {
            text: draft.clone(),
            from_draft: true,
        });
    }

    let index = repertoire
        .versions
        .iter()
        .position(|v| v.id == version_id)
        .unwrap_or_default();
    let songs = state.repo.get_songs_by_ids(&repertoire.songs).await?;
    let ordered = ordered_songs(&repertoire, index, &songs);
    let sections: Vec<LyricSection<'_>> = ordered
        .iter()
        .map(|entry| LyricSection {
            title: &entry.song.title,
            lyrics: entry.effective_lyrics(),
        })
        .collect();

    success(BulkLyricsResponse {
        text: compose_bulk_lyrics(&sections),
        from_draft: false,
    })
}

/// PUT /api/repertoires/:id/versions/:version_id/lyrics - Save bulk editor text.
///
/// Every song's lyrics and the verbatim text are stored in one write.
pub async fn save_bulk_lyrics(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, version_id)): Path<(String, String)>,
    Json(request): Json<SaveBulkLyricsRequest>,
) -> ApiResult<BulkLyricsResponse> {
    let repertoire = load_repertoire_for_member(&state, &id, &user).await?;
    let index = repertoire
        .versions
        .iter()
        .position(|v| v.id == version_id)
        .ok_or_else(|| AppError::NotFound(format!("Version {} not found", version_id)))?;

    let songs = state.repo.get_songs_by_ids(&repertoire.songs).await?;
    let song_ids: Vec<String> = ordered_songs(&repertoire, index, &songs)
        .iter()
        .map(|entry| entry.song.id.clone())
        .collect();
    let parsed = parse_bulk_lyrics(&request.text, song_ids.len());
    let lyrics: Vec<(String, String)> = song_ids.into_iter().zip(parsed).collect();

    let text = request.text;
    state
        .repo
        .modify_repertoire(&id, Some(repertoire.version), |r| {
            r.save_bulk_lyrics(&version_id, lyrics, text.clone())
        })
        .await?;
    tracing::info!(repertoire_id = %id, version_id = %version_id, "Saved bulk lyrics");

    success(BulkLyricsResponse {
        text,
        from_draft: true,
    })
}
