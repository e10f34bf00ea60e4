//! Song model with its capped play history.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{EntityRef, MediaLink};

/// Number of play-history entries kept per song. Older entries are evicted on write.
pub const MAX_PLAY_HISTORY: usize = 3;

/// Liturgical use of a song.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "lowercase")]
pub enum SongCategory {
    Praise,
    Worship,
    Offering,
    Communion,
    Christmas,
    Easter,
    #[default]
    Other,
}

impl SongCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongCategory::Praise => "praise",
            SongCategory::Worship => "worship",
            SongCategory::Offering => "offering",
            SongCategory::Communion => "communion",
            SongCategory::Christmas => "christmas",
            SongCategory::Easter => "easter",
            SongCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "praise" => Some(SongCategory::Praise),
            "worship" => Some(SongCategory::Worship),
            "offering" => Some(SongCategory::Offering),
            "communion" => Some(SongCategory::Communion),
            "christmas" => Some(SongCategory::Christmas),
            "easter" => Some(SongCategory::Easter),
            "other" => Some(SongCategory::Other),
            _ => None,
        }
    }
}

/// A single performance of a song.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayHistoryEntry {
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

/// A song owned by a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub group_id: String,
    pub title: String,
    #[serde(default)]
    pub lyrics: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub category: SongCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tempo: Option<i32>,
    #[serde(default)]
    pub media_links: Vec<MediaLink>,
    #[serde(default)]
    pub play_history: Vec<PlayHistoryEntry>,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

impl Song {
    /// Append a play at `date` and evict everything but the newest entries.
    pub fn record_play(
        &mut self,
        date: DateTime<Utc>,
        notes: Option<String>,
        event: Option<String>,
    ) -> &PlayHistoryEntry {
        self.play_history.push(PlayHistoryEntry { date, notes, event });
        trim_play_history(&mut self.play_history, MAX_PLAY_HISTORY);
        &self.play_history[self.play_history.len() - 1]
    }

    pub fn last_played(&self) -> Option<DateTime<Utc>> {
        self.play_history.last().map(|entry| entry.date)
    }

    /// Whole days elapsed since the last play, or None if never played.
    pub fn days_since_last_played(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_played()
            .map(|last| (now - last).num_days().max(0))
    }
}

/// Keep only the newest `keep` entries of a chronological history.
///
/// Returns the number of entries evicted.
pub fn trim_play_history(history: &mut Vec<PlayHistoryEntry>, keep: usize) -> usize {
    if history.len() <= keep {
        return 0;
    }
    let excess = history.len() - keep;
    history.drain(..excess);
    excess
}

/// Trim, drop blanks and de-duplicate tags while keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.iter().any(|t| t.eq_ignore_ascii_case(&tag)) {
            out.push(tag);
        }
    }
    out
}

/// Song as returned by the API, with derived play statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongResponse {
    #[serde(flatten)]
    pub song: Song,
    pub last_played: Option<DateTime<Utc>>,
    pub days_since_last_played: Option<i64>,
}

impl From<Song> for SongResponse {
    fn from(song: Song) -> Self {
        let last_played = song.last_played();
        let days_since_last_played = song.days_since_last_played(Utc::now());
        Self {
            song,
            last_played,
            days_since_last_played,
        }
    }
}

/// Request body for creating a new song.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSongRequest {
    pub title: String,
    pub group_id: EntityRef,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub chords: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<SongCategory>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub tempo: Option<i32>,
}

/// Request body for updating an existing song.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSongRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub lyrics: Option<String>,
    #[serde(default)]
    pub chords: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub category: Option<SongCategory>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub tempo: Option<i32>,
    /// Expected version for optimistic concurrency control
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl UpdateSongRequest {
    /// Apply the supplied fields onto a song. Absent fields are left untouched.
    pub fn apply(&self, song: &mut Song) -> Result<(), String> {
        if let Some(title) = &self.title {
            let title = title.trim();
            if title.is_empty() {
                return Err("Title cannot be empty".to_string());
            }
            song.title = title.to_string();
        }
        if let Some(lyrics) = &self.lyrics {
            song.lyrics = lyrics.clone();
        }
        if let Some(chords) = &self.chords {
            song.chords = Some(chords.clone());
        }
        if let Some(author) = &self.author {
            song.author = Some(author.clone());
        }
        if let Some(category) = self.category {
            song.category = category;
        }
        if let Some(tags) = &self.tags {
            song.tags = normalize_tags(tags.clone());
        }
        if let Some(key) = &self.key {
            song.key = Some(key.clone());
        }
        if let Some(tempo) = self.tempo {
            song.tempo = Some(tempo);
        }
        Ok(())
    }
}

/// Request body for marking a song or repertoire as played.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPlayRequest {
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    /// Only meaningful for repertoires: which version was performed.
    #[serde(default)]
    pub version_index: Option<usize>,
}

/// Aggregate statistics for a group's song catalogue.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SongStats {
    pub total_songs: usize,
    pub by_category: BTreeMap<String, usize>,
    pub never_played: usize,
    pub played_last_30_days: usize,
    pub top_tags: Vec<TagCount>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Maximum number of tags reported in song statistics.
const TOP_TAGS: usize = 10;

pub fn song_stats(songs: &[Song], now: DateTime<Utc>) -> SongStats {
    let mut by_category = BTreeMap::new();
    let mut tag_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut never_played = 0;
    let mut played_last_30_days = 0;
    let cutoff = now - Duration::days(30);

    for song in songs {
        *by_category
            .entry(song.category.as_str().to_string())
            .or_insert(0) += 1;
        for tag in &song.tags {
            *tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
        match song.last_played() {
            None => never_played += 1,
            Some(last) if last >= cutoff => played_last_30_days += 1,
            Some(_) => {}
        }
    }

    let mut top_tags: Vec<TagCount> = tag_counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    // BTreeMap iteration already sorted by name; stable sort keeps that for ties.
    top_tags.sort_by(|a, b| b.count.cmp(&a.count));
    top_tags.truncate(TOP_TAGS);

    SongStats {
        total_songs: songs.len(),
        by_category,
        never_played,
        played_last_30_days,
        top_tags,
    }
}
