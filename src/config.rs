//! Client configuration.
//!
//! Every tunable the client relies on lives here with the value the web page
//! ships with. Hosts may override any subset from JSON; missing keys keep
//! their defaults.

use serde::Deserialize;

/// Preferred camera stream parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    /// `facingMode` hint passed to the platform ("user" = front camera).
    pub facing_mode: String,
    /// JPEG quality (1-100) used when snapshotting a camera frame.
    pub jpeg_quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ideal_width: 720,
            ideal_height: 540,
            facing_mode: "user".to_string(),
            jpeg_quality: 90,
        }
    }
}

/// Scene engine gating and output parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Viewports narrower than this get the static fallback.
    pub min_viewport_width: f64,
    /// Minimum backdrop height in CSS pixels.
    pub min_ambient_height: f64,
    pub ambient_max_pixel_ratio: f64,
    pub viewer_max_pixel_ratio: f64,
    /// Seed for procedural placement; `None` lets the host pick one.
    pub seed: Option<u64>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            min_viewport_width: 680.0,
            min_ambient_height: 320.0,
            ambient_max_pixel_ratio: 2.2,
            viewer_max_pixel_ratio: 2.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Port the analysis service listens on when not behind a proxy.
    pub service_port: u16,
    /// Countdown ceiling before the reduced-motion adjustment.
    pub countdown_seconds: u32,
    /// Largest accepted upload in bytes.
    pub max_upload_bytes: u64,
    /// How long a notice stays on screen.
    pub notice_ms: u32,
    /// Delay between the loading step indicators.
    pub loading_step_ms: u32,
    pub capture: CaptureConfig,
    pub scene: SceneConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_port: 5000,
            countdown_seconds: 18,
            max_upload_bytes: 5 * 1024 * 1024,
            notice_ms: 4200,
            loading_step_ms: 900,
            capture: CaptureConfig::default(),
            scene: SceneConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse a (possibly partial) JSON override on top of the defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_page() {
        let config = ClientConfig::default();
        assert_eq!(config.service_port, 5000);
        assert_eq!(config.countdown_seconds, 18);
        assert_eq!(config.max_upload_bytes, 5_242_880);
        assert_eq!(config.capture.ideal_width, 720);
        assert_eq!(config.scene.min_viewport_width, 680.0);
    }

    #[test]
    fn test_partial_override() {
        let config = ClientConfig::from_json(r#"{"countdown_seconds": 30, "scene": {"seed": 7}}"#).unwrap();
        assert_eq!(config.countdown_seconds, 30);
        assert_eq!(config.scene.seed, Some(7));
        assert_eq!(config.scene.min_ambient_height, 320.0);
        assert_eq!(config.notice_ms, 4200);
    }
}
