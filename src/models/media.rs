//! Media links attached to songs and repertoires.

use serde::{Deserialize, Serialize};

/// An external recording or reference for a song or repertoire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaLink {
    pub id: String,
    pub title: String,
    pub url: String,
    pub platform: String,
}

/// Request body for attaching a media link.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMediaLinkRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub platform: Option<String>,
}

impl CreateMediaLinkRequest {
    /// Validate and turn the request into a stored link with a fresh id.
    pub fn into_link(self) -> Result<MediaLink, String> {
        let url = self.url.trim().to_string();
        if url.is_empty() {
            return Err("Media link URL is required".to_string());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("Media link URL must start with http:// or https://".to_string());
        }

        let platform = self
            .platform
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| infer_platform(&url).to_string());
        let title = self
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| url.clone());

        Ok(MediaLink {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            url,
            platform,
        })
    }
}

/// Guess the hosting platform from a URL.
pub fn infer_platform(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    if lower.contains("youtube.com") || lower.contains("youtu.be") {
        "youtube"
    } else if lower.contains("spotify.com") {
        "spotify"
    } else if lower.contains("soundcloud.com") {
        "soundcloud"
    } else {
        "other"
    }
}

/// Remove a link by id. Returns false when no link had that id.
pub fn remove_link(links: &mut Vec<MediaLink>, link_id: &str) -> bool {
    let before = links.len();
    links.retain(|l| l.id != link_id);
    links.len() != before
}
