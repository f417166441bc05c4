//! Projection of an [`AnalysisResult`] into what the results panel shows.

use serde::Serialize;

use crate::analysis::{AnalysisResult, Track};

/// Title of the platform share sheet.
pub const SHARE_TITLE: &str = "My MoodMusic AI playlist";
pub const EMPTY_TRACKS_TEXT: &str = "No tracks yet – try another capture or check your connection.";
const DEFAULT_DESCRIPTION: &str = "Curated tunes coming right up!";

/// Font Awesome icon for an emotion label.
pub fn emotion_icon(emotion: &str) -> &'static str {
    match emotion {
        "happy" => "fa-face-grin-stars",
        "sad" => "fa-face-sad-tear",
        "angry" => "fa-face-angry",
        "surprise" => "fa-face-surprise",
        "fear" => "fa-face-frown-open",
        "disgust" => "fa-face-dizzy",
        "neutral" => "fa-face-meh",
        _ => "fa-face-smile",
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackCard {
    pub title: String,
    pub artist: String,
    pub reason: String,
    pub youtube: String,
    pub spotify: String,
    /// Stagger for the card entrance animation.
    pub delay_ms: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub icon: &'static str,
    pub title: String,
    pub description: String,
    /// Rounded and clamped to 0..=100.
    pub confidence_pct: u8,
    pub confidence_text: String,
    /// "label: 12.3%" chips, highest first. Empty hides the breakdown.
    pub breakdown: Vec<String>,
    pub tracks: Vec<TrackCard>,
    /// `None` hides the summary block.
    pub curator_summary: Option<String>,
}

impl ResultView {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let confidence_pct = result.confidence.round().clamp(0.0, 100.0) as u8;

        let mut entries: Vec<(&String, &f64)> = result.breakdown.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(a.1));
        let breakdown = entries
            .into_iter()
            .map(|(label, value)| format!("{}: {:.1}%", label, value))
            .collect();

        let tracks = result
            .tracks
            .iter()
            .enumerate()
            .map(|(index, track)| TrackCard {
                title: track.title.clone(),
                artist: track.artist.clone(),
                reason: track.reason.clone(),
                youtube: track.links.primary.clone(),
                spotify: track.links.secondary.clone(),
                delay_ms: index as u32 * 120,
            })
            .collect();

        let description = if result.description.is_empty() {
            DEFAULT_DESCRIPTION.to_string()
        } else {
            result.description.clone()
        };

        Self {
            icon: emotion_icon(&result.emotion),
            title: format!("Your Mood: {}", capitalize(&result.emotion)),
            description,
            confidence_pct,
            confidence_text: format!("{}% confident", confidence_pct),
            breakdown,
            tracks,
            curator_summary: curator_summary(&result.curator_summary, &result.description),
        }
    }
}

/// Summary text, falling back to the description. `None` when both are blank.
pub fn curator_summary(summary: &str, fallback: &str) -> Option<String> {
    [summary, fallback]
        .iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn track_line(rank: usize, track: &Track) -> String {
    format!("{}. {} – {}", rank, track.title, track.artist)
}

/// Short text digest for sharing: emotion, description and the top three tracks.
pub fn share_digest(result: &AnalysisResult) -> String {
    let picks: Vec<String> = result
        .tracks
        .iter()
        .take(3)
        .enumerate()
        .map(|(index, track)| track_line(index + 1, track))
        .collect();

    format!(
        "MoodMusic decoded my vibe as {}. {}\nTop picks:\n{}",
        result.emotion,
        result.description,
        picks.join("\n")
    )
}
