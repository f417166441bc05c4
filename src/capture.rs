//! The photo held by the workflow, from either the camera or a file.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageReader};

use crate::error::{CameraError, InputError};

/// Where the held image came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Camera,
    File { name: String },
}

/// Metadata of a file the user picked or dropped, checked before reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub mime: String,
    pub size: u64,
}

impl FileMeta {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            size,
        }
    }

    /// Type must be `image/*` and size at most `max_bytes`.
    pub fn validate(&self, max_bytes: u64) -> Result<(), InputError> {
        if !self.mime.starts_with("image/") {
            return Err(InputError::NotAnImage { mime: self.mime.clone() });
        }
        if self.size > max_bytes {
            return Err(InputError::TooLarge {
                size: self.size,
                limit: max_bytes,
            });
        }
        Ok(())
    }
}

/// A single decoded camera frame, tightly packed RGBA8.
#[derive(Debug, Clone)]
pub struct RgbaFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self { width, height, pixels }
    }
}

/// An encoded image ready to be sent, stored as a `data:` URL.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedImage {
    data_url: String,
    mime: String,
    byte_len: usize,
    dimensions: Option<(u32, u32)>,
    source: ImageSource,
}

impl CapturedImage {
    /// Wrap the raw bytes of an uploaded file.
    ///
    /// The bytes are not decoded; dimensions are read from the header when the
    /// format is one we recognise (HEIC, for instance, is passed through as is).
    pub fn from_file(meta: &FileMeta, bytes: &[u8]) -> Result<Self, InputError> {
        if bytes.is_empty() {
            return Err(InputError::Unreadable(format!("{} is empty", meta.name)));
        }

        let dimensions = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()
            .and_then(|reader| reader.into_dimensions().ok());

        Ok(Self {
            data_url: data_url(&meta.mime, bytes),
            mime: meta.mime.clone(),
            byte_len: bytes.len(),
            dimensions,
            source: ImageSource::File { name: meta.name.clone() },
        })
    }

    /// Snapshot a camera frame as JPEG at the given quality.
    ///
    /// A frame with zero width or height means the video has not decoded
    /// anything yet.
    pub fn from_frame(frame: &RgbaFrame, quality: u8) -> Result<Self, CameraError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(CameraError::NotReady);
        }
        let expected = frame.width as usize * frame.height as usize * 4;
        if frame.pixels.len() < expected {
            return Err(CameraError::Other(format!(
                "frame holds {} bytes, expected {}",
                frame.pixels.len(),
                expected
            )));
        }

        // JPEG has no alpha channel
        let rgb: Vec<u8> = frame.pixels[..expected]
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
            .encode(&rgb, frame.width, frame.height, ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Other(format!("JPEG encoding failed: {}", e)))?;

        Ok(Self {
            data_url: data_url("image/jpeg", &jpeg),
            mime: "image/jpeg".to_string(),
            byte_len: jpeg.len(),
            dimensions: Some((frame.width, frame.height)),
            source: ImageSource::Camera,
        })
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Size of the encoded image before base64.
    pub fn byte_len(&self) -> usize {
        self.byte_len
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }
}

fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
