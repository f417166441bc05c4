//! Analysis result model and the decode-with-defaults step.
//!
//! The service is loose about which fields it fills in. Everything optional is
//! resolved here, once, so the rest of the client only ever sees a fully
//! populated [`AnalysisResult`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub const DEFAULT_EMOTION: &str = "neutral";
pub const DEFAULT_TITLE: &str = "Untitled track";
pub const DEFAULT_ARTIST: &str = "Unknown artist";
pub const DEFAULT_REASON: &str = "Handpicked for your vibe.";
/// Link placeholder for tracks the service returned without one.
pub const NO_LINK: &str = "#";

// ============================================================================
// Wire format
// ============================================================================

/// Body of a successful or failed `/api/analyze` or `/api/mood` response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisPayload {
    pub emotion: Option<String>,
    pub description: Option<String>,
    pub confidence: Option<f64>,
    pub all_emotions: Option<BTreeMap<String, f64>>,
    pub songs: Option<Vec<SongPayload>>,
    pub curator_summary: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SongPayload {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub reason: Option<String>,
    pub youtube_link: Option<String>,
    pub spotify_search: Option<String>,
}

// ============================================================================
// Normalized model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackLinks {
    /// YouTube link.
    pub primary: String,
    /// Spotify search link.
    pub secondary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    pub reason: String,
    pub links: TrackLinks,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub emotion: String,
    pub description: String,
    /// Percentage in 0..=100.
    pub confidence: f64,
    /// Per-label percentages.
    pub breakdown: BTreeMap<String, f64>,
    pub tracks: Vec<Track>,
    pub curator_summary: String,
}

/// Present and non-blank, trimmed.
fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl From<SongPayload> for Track {
    fn from(song: SongPayload) -> Self {
        Self {
            title: non_blank(song.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            artist: non_blank(song.artist).unwrap_or_else(|| DEFAULT_ARTIST.to_string()),
            reason: non_blank(song.reason).unwrap_or_else(|| DEFAULT_REASON.to_string()),
            links: TrackLinks {
                primary: non_blank(song.youtube_link).unwrap_or_else(|| NO_LINK.to_string()),
                secondary: non_blank(song.spotify_search).unwrap_or_else(|| NO_LINK.to_string()),
            },
        }
    }
}

impl AnalysisPayload {
    /// Turn a payload into a complete result.
    ///
    /// A non-empty `error` field rejects the whole payload even when the rest
    /// looks valid. `fallback_description` fills a missing description (the
    /// mood text for mood requests, empty for photos).
    pub fn decode(self, fallback_description: &str) -> Result<AnalysisResult, ServiceError> {
        if let Some(message) = non_blank(self.error) {
            return Err(ServiceError::Rejected(message));
        }

        let confidence = self
            .confidence
            .filter(|c| c.is_finite())
            .unwrap_or(0.0)
            .clamp(0.0, 100.0);

        let breakdown = self
            .all_emotions
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, value)| value.is_finite())
            .collect();

        Ok(AnalysisResult {
            emotion: non_blank(self.emotion).unwrap_or_else(|| DEFAULT_EMOTION.to_string()),
            description: non_blank(self.description)
                .unwrap_or_else(|| fallback_description.trim().to_string()),
            confidence,
            breakdown,
            tracks: self.songs.unwrap_or_default().into_iter().map(Track::from).collect(),
            curator_summary: non_blank(self.curator_summary).unwrap_or_default(),
        })
    }
}

/// Parse and decode a response body in one go.
pub fn decode_body(body: &str, fallback_description: &str) -> Result<AnalysisResult, ServiceError> {
    let payload: AnalysisPayload =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode(e.to_string()))?;
    payload.decode(fallback_description)
}
