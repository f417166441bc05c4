//! Remote analysis service boundary.
//!
//! Two endpoints, one response shape:
//!
//! - `POST /api/analyze { "image": <data-url> }`
//! - `POST /api/mood { "mood": <text> }`
//!
//! Both answer with the payload decoded in [`crate::analysis`], or with
//! `{ "error": ... }`.

use serde_json::json;

use crate::analysis::{AnalysisPayload, AnalysisResult};
use crate::error::ServiceError;

pub const ANALYZE_PATH: &str = "/api/analyze";
pub const MOOD_PATH: &str = "/api/mood";

/// Base address the endpoints hang off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiBase(String);

impl ApiBase {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self(base.trim_end_matches('/').to_string())
    }

    /// Derive the base from the page location.
    ///
    /// A page without an explicit port (reverse proxy) or served from the
    /// service port itself talks to its own origin. Anything else (a dev
    /// server on another port) talks to the service port on the same host.
    pub fn from_location(protocol: &str, hostname: &str, port: &str, service_port: u16) -> Self {
        let host = if hostname.is_empty() { "127.0.0.1" } else { hostname };

        if port.is_empty() || port == service_port.to_string() {
            let origin = if port.is_empty() {
                format!("{}//{}", protocol, host)
            } else {
                format!("{}//{}:{}", protocol, host, port)
            };
            return Self::new(origin);
        }

        let protocol = if protocol.starts_with("http") { protocol } else { "http:" };
        Self::new(format!("{}//{}:{}", protocol, host, service_port))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.0, path)
    }
}

/// One of the two analysis calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisRequest {
    Image { data_url: String },
    Mood { text: String },
}

impl AnalysisRequest {
    pub fn path(&self) -> &'static str {
        match self {
            AnalysisRequest::Image { .. } => ANALYZE_PATH,
            AnalysisRequest::Mood { .. } => MOOD_PATH,
        }
    }

    pub fn body(&self) -> serde_json::Value {
        match self {
            AnalysisRequest::Image { data_url } => json!({ "image": data_url }),
            AnalysisRequest::Mood { text } => json!({ "mood": text }),
        }
    }

    /// Description used when the service leaves it out.
    pub fn fallback_description(&self) -> &str {
        match self {
            AnalysisRequest::Image { .. } => "",
            AnalysisRequest::Mood { text } => text,
        }
    }

    /// Notice text when the service gives no message of its own.
    pub fn failure_text(&self) -> &'static str {
        match self {
            AnalysisRequest::Image { .. } => "Mood analysis failed. Please try again.",
            AnalysisRequest::Mood { .. } => "Could not build a playlist. Try again.",
        }
    }
}

/// Anything that can answer an [`AnalysisRequest`].
#[allow(async_fn_in_trait)]
pub trait AnalysisService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ServiceError>;
}

/// Interpret a raw HTTP answer.
///
/// The body is inspected even on error statuses because the service puts its
/// message there.
pub fn interpret_response(
    status: u16,
    body: &str,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, ServiceError> {
    let success = (200..300).contains(&status);

    match serde_json::from_str::<AnalysisPayload>(body) {
        Ok(payload) => {
            if let Some(message) = payload.error.as_deref().filter(|m| !m.trim().is_empty()) {
                return Err(ServiceError::Rejected(message.trim().to_string()));
            }
            if !success {
                return Err(ServiceError::Status(status));
            }
            payload.decode(request.fallback_description())
        }
        Err(_) if !success => Err(ServiceError::Status(status)),
        Err(e) => Err(ServiceError::Decode(e.to_string())),
    }
}

/// The real service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAnalysisService {
    client: reqwest::Client,
    base: ApiBase,
}

impl HttpAnalysisService {
    pub fn new(base: ApiBase) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    pub fn base(&self) -> &ApiBase {
        &self.base
    }
}

impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResult, ServiceError> {
        let url = self.base.endpoint(request.path());
        log::info!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request.body())
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;

        log::debug!("{} answered {} ({} bytes)", url, status, body.len());
        interpret_response(status, &body, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_same_origin_without_port() {
        let base = ApiBase::from_location("https:", "mood.example", "", 5000);
        assert_eq!(base.endpoint(ANALYZE_PATH), "https://mood.example/api/analyze");
    }

    #[test]
    fn test_base_same_origin_on_service_port() {
        let base = ApiBase::from_location("http:", "localhost", "5000", 5000);
        assert_eq!(base.as_str(), "http://localhost:5000");
    }

    #[test]
    fn test_base_switches_to_service_port() {
        let base = ApiBase::from_location("http:", "localhost", "8080", 5000);
        assert_eq!(base.as_str(), "http://localhost:5000");

        let base = ApiBase::from_location("file:", "", "3000", 5000);
        assert_eq!(base.as_str(), "http://127.0.0.1:5000");
    }

    #[test]
    fn test_request_bodies() {
        let mood = AnalysisRequest::Mood { text: "sunny".into() };
        assert_eq!(mood.path(), MOOD_PATH);
        assert_eq!(mood.body(), json!({ "mood": "sunny" }));

        let image = AnalysisRequest::Image { data_url: "data:image/png;base64,AA==".into() };
        assert_eq!(image.body()["image"], "data:image/png;base64,AA==");
    }

    #[test]
    fn test_error_status_with_message() {
        let request = AnalysisRequest::Image { data_url: String::new() };
        let err = interpret_response(400, r#"{"error":"no face detected"}"#, &request).unwrap_err();
        assert_eq!(err, ServiceError::Rejected("no face detected".into()));
    }

    #[test]
    fn test_error_status_without_body() {
        let request = AnalysisRequest::Mood { text: "x".into() };
        let err = interpret_response(502, "Bad Gateway", &request).unwrap_err();
        assert_eq!(err, ServiceError::Status(502));
        assert_eq!(err.service_message(), None);
    }

    #[test]
    fn test_success_decodes() {
        let request = AnalysisRequest::Mood { text: "calm".into() };
        let result = interpret_response(200, r#"{"emotion":"happy"}"#, &request).unwrap();
        assert_eq!(result.emotion, "happy");
        assert_eq!(result.description, "calm");
    }
}
