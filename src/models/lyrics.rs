//! Bulk lyric editor text format.
//!
//! All songs of a version are presented as one editable text, each song
//! wrapped in numbered markers:
//!
//! ```text
//! --- SONG 1: Amazing Grace ---
//! Amazing grace, how sweet the sound
//! --- END SONG 1 ---
//! ```
//!
//! Songs are numbered from 1 in display order. Markers are located by
//! number only, so edits to the title inside a start marker are harmless.

use serde::{Deserialize, Serialize};

/// One song section of the bulk text.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricSection<'a> {
    pub title: &'a str,
    pub lyrics: &'a str,
}

fn start_marker_prefix(n: usize) -> String {
    format!("--- SONG {}:", n)
}

fn end_marker(n: usize) -> String {
    format!("--- END SONG {} ---", n)
}

/// Build the bulk text for songs in display order.
pub fn compose_bulk_lyrics(sections: &[LyricSection<'_>]) -> String {
    sections
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let n = i + 1;
            format!(
                "{} {} ---\n{}\n{}",
                start_marker_prefix(n),
                section.title,
                section.lyrics.trim(),
                end_marker(n)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split bulk text back into per-song lyrics for `count` songs.
///
/// A song whose marker pair cannot be found gets an empty string.
pub fn parse_bulk_lyrics(text: &str, count: usize) -> Vec<String> {
    (1..=count).map(|n| extract_section(text, n)).collect()
}

fn extract_section(text: &str, n: usize) -> String {
    let Some(start) = text.find(&start_marker_prefix(n)) else {
        return String::new();
    };
    let Some(line_end) = text[start..].find('\n') else {
        return String::new();
    };
    let body_start = start + line_end + 1;
    match text[body_start..].find(&end_marker(n)) {
        Some(end) => text[body_start..body_start + end].trim().to_string(),
        None => String::new(),
    }
}

/// Request body for saving the bulk editor text.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveBulkLyricsRequest {
    pub text: String,
}

/// Bulk editor text as served to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkLyricsResponse {
    pub text: String,
    /// True when the text is the verbatim saved draft rather than rebuilt from songs.
    pub from_draft: bool,
}
