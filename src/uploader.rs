//! Client side of the relay: validate, shrink, submit, report.
//!
//! Mirrors what the browser front-end does before an image ever reaches the
//! relay. Validation failures never touch the network; every submission is
//! exactly one POST with one multipart field.

use std::time::Duration;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use reqwest::multipart::{Form, Part};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::schema::{ExtractionResponse, IMAGE_FIELD};
use crate::upload::Upload;

pub const MAX_FILE_BYTES: usize = 5 * 1024 * 1024;
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp"];
pub const MAX_DIMENSION: u32 = 2000;
pub const JPEG_QUALITY: u8 = 80;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("File size should be less than 5MB")]
    FileTooLarge { size: usize },

    #[error("Please upload a valid image file (JPG, PNG, WEBP)")]
    UnsupportedType { mime_type: String },

    #[error("Request timed out. Please try again with a smaller image or better connection.")]
    Timeout,

    #[error("Error: {message}")]
    Relay {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("Error: Invalid response from server.")]
    InvalidResponse { status: u16 },

    #[error("Network error: {0}. Please try again.")]
    Transport(#[source] reqwest::Error),
}

impl UploadError {
    /// Rejected before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            UploadError::FileTooLarge { .. } | UploadError::UnsupportedType { .. }
        )
    }
}

/// Reject anything over the size limit or outside the type allowlist.
pub fn validate(upload: &Upload) -> Result<(), UploadError> {
    if upload.len() > MAX_FILE_BYTES {
        return Err(UploadError::FileTooLarge { size: upload.len() });
    }
    let essence = upload.essence();
    if !ACCEPTED_MIME_TYPES.contains(&essence.as_str()) {
        return Err(UploadError::UnsupportedType {
            mime_type: upload.mime_type.clone(),
        });
    }
    Ok(())
}

/// Best-effort payload reduction: fit within 2000×2000 and re-encode as JPEG.
///
/// Returns the original upload if decoding or encoding fails, or if nothing
/// was resized and the JPEG would not be smaller.
pub fn optimize(upload: Upload) -> Upload {
    match reencode(&upload) {
        Ok((bytes, resized)) if resized || bytes.len() < upload.len() => {
            debug!(
                "optimized {}: {} -> {} bytes (resized: {})",
                upload.filename,
                upload.len(),
                bytes.len(),
                resized
            );
            Upload::new(bytes, "image/jpeg", upload.filename)
        }
        Ok(_) => upload,
        Err(e) => {
            warn!("optimization skipped for {}: {}", upload.filename, e);
            upload
        }
    }
}

fn reencode(upload: &Upload) -> image::ImageResult<(Vec<u8>, bool)> {
    let img = image::load_from_memory(&upload.bytes)?;
    let resized = img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION;
    let img = if resized {
        img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Triangle)
    } else {
        img
    };

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&rgb)?;
    Ok((buf, resized))
}

// ============================================================================
// Progress
// ============================================================================

/// Request lifecycle phases, as a percentage for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Idle = 0,
    Begin = 10,
    Optimized = 20,
    Sent = 40,
    ResponseReceived = 70,
    Complete = 100,
}

impl Stage {
    pub fn percent(self) -> u8 {
        self as u8
    }
}

/// Monotonic progress: reports only forward movement.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    current: u8,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    /// Move to `stage` if it is ahead; returns whether progress changed.
    pub fn advance(&mut self, stage: Stage) -> bool {
        let pct = stage.percent();
        if pct > self.current {
            self.current = pct;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.current = 0;
    }
}

// ============================================================================
// Uploader
// ============================================================================

/// Submits uploads to a relay endpoint.
#[derive(Clone)]
pub struct Uploader {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    optimize: bool,
}

impl Uploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            timeout: DEFAULT_TIMEOUT,
            optimize: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_optimize(mut self, optimize: bool) -> Self {
        self.optimize = optimize;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Validate, optionally shrink, and send one upload.
    ///
    /// `on_progress` receives each stage reached, in order.
    pub async fn extract<F>(&self, upload: Upload, mut on_progress: F) -> Result<String, UploadError>
    where
        F: FnMut(Stage),
    {
        validate(&upload)?;
        on_progress(Stage::Begin);

        let upload = if self.optimize {
            optimize(upload)
        } else {
            upload
        };
        on_progress(Stage::Optimized);

        let part = Part::bytes(upload.bytes)
            .file_name(upload.filename)
            .mime_str(&upload.mime_type)
            .map_err(UploadError::Transport)?;
        let form = Form::new().part(IMAGE_FIELD, part);

        info!("Uploading to {}", self.endpoint);
        let request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send();
        on_progress(Stage::Sent);

        let response = request.await.map_err(map_transport)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport)?;
        on_progress(Stage::ResponseReceived);

        let parsed: Option<ExtractionResponse> = serde_json::from_str(&body).ok();
        let result = match parsed {
            Some(ExtractionResponse::Text { text }) if status.is_success() => Ok(text),
            Some(ExtractionResponse::Error { error, details }) => Err(UploadError::Relay {
                status: status.as_u16(),
                message: error,
                details,
            }),
            Some(ExtractionResponse::Text { .. }) | None if !status.is_success() => {
                Err(UploadError::Relay {
                    status: status.as_u16(),
                    message: format!("OCR error: {}", status.as_u16()),
                    details: None,
                })
            }
            _ => Err(UploadError::InvalidResponse {
                status: status.as_u16(),
            }),
        };
        on_progress(Stage::Complete);
        result
    }
}

fn map_transport(e: reqwest::Error) -> UploadError {
    if e.is_timeout() {
        UploadError::Timeout
    } else {
        UploadError::Transport(e)
    }
}

// ============================================================================
// Session
// ============================================================================

/// One user's upload state: the last outcome plus progress.
///
/// `submit` takes `&mut self`, so a session never has two uploads in flight.
pub struct UploadSession {
    uploader: Uploader,
    progress: ProgressTracker,
    outcome: Option<Result<String, UploadError>>,
}

impl UploadSession {
    pub fn new(uploader: Uploader) -> Self {
        Self {
            uploader,
            progress: ProgressTracker::new(),
            outcome: None,
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress.current()
    }

    pub fn outcome(&self) -> Option<&Result<String, UploadError>> {
        self.outcome.as_ref()
    }

    /// Run one upload, replacing whatever the previous one produced.
    pub async fn submit<F>(&mut self, upload: Upload, mut on_progress: F) -> &Result<String, UploadError>
    where
        F: FnMut(u8),
    {
        self.outcome = None;
        self.progress.reset();

        let progress = &mut self.progress;
        let result = self
            .uploader
            .extract(upload, |stage| {
                if progress.advance(stage) {
                    on_progress(progress.current());
                }
            })
            .await;

        if let Err(e) = &result {
            warn!("Upload failed: {}", e);
        }
        self.outcome.insert(result)
    }

    /// Drop the last outcome and reset progress.
    pub fn clear(&mut self) {
        self.outcome = None;
        self.progress.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 30, 30])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    fn uploader_for(server: &MockServer) -> Uploader {
        Uploader::new(format!("{}/api/extract-text", server.uri())).with_optimize(false)
    }

    fn small_upload() -> Upload {
        Upload::new(b"tiny image".to_vec(), "image/png", "scan.png")
    }

    #[test]
    fn test_validate_limits() {
        assert!(validate(&small_upload()).is_ok());
        assert!(validate(&Upload::new(vec![0; MAX_FILE_BYTES], "image/jpeg", "a.jpg")).is_ok());
        assert!(validate(&Upload::new(vec![0; 1], "image/webp", "a.webp")).is_ok());

        let err = validate(&Upload::new(vec![0; MAX_FILE_BYTES + 1], "image/png", "a.png")).unwrap_err();
        assert!(matches!(err, UploadError::FileTooLarge { .. }));
        assert_eq!(err.to_string(), "File size should be less than 5MB");

        let err = validate(&Upload::new(vec![0; 10], "image/gif", "a.gif")).unwrap_err();
        assert!(matches!(err, UploadError::UnsupportedType { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_optimize_bounds_large_images() {
        let original = Upload::new(png_bytes(3000, 1000), "image/png", "wide.png");
        let optimized = optimize(original);
        assert_eq!(optimized.mime_type, "image/jpeg");
        assert_eq!(optimized.filename, "wide.png");

        let img = image::load_from_memory(&optimized.bytes).unwrap();
        assert_eq!(img.dimensions(), (2000, 667));
    }

    #[test]
    fn test_optimize_falls_back_on_undecodable_input() {
        let original = Upload::new(b"definitely not pixels".to_vec(), "image/png", "x.png");
        let result = optimize(original.clone());
        assert_eq!(result.bytes, original.bytes);
        assert_eq!(result.mime_type, "image/png");
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut tracker = ProgressTracker::new();
        assert!(tracker.advance(Stage::Sent));
        assert!(!tracker.advance(Stage::Begin));
        assert_eq!(tracker.current(), 40);
        assert!(tracker.advance(Stage::Complete));
        assert_eq!(tracker.current(), 100);
        tracker.reset();
        assert_eq!(tracker.current(), Stage::Idle.percent());
    }

    #[tokio::test]
    async fn test_valid_upload_makes_exactly_one_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/extract-text"))
            .and(body_string_contains("name=\"image\""))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "Hello" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let mut stages = Vec::new();
        let text = uploader_for(&mock_server)
            .extract(small_upload(), |s| stages.push(s))
            .await
            .unwrap();

        assert_eq!(text, "Hello");
        assert_eq!(
            stages,
            vec![
                Stage::Begin,
                Stage::Optimized,
                Stage::Sent,
                Stage::ResponseReceived,
                Stage::Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_upload_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let uploader = uploader_for(&mock_server);
        let too_big = Upload::new(vec![0; MAX_FILE_BYTES + 1], "image/png", "big.png");
        let err = uploader.extract(too_big, |_| {}).await.unwrap_err();
        assert!(err.is_validation());

        let wrong_type = Upload::new(b"%PDF".to_vec(), "application/pdf", "doc.pdf");
        let err = uploader.extract(wrong_type, |_| {}).await.unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_relay_error_is_surfaced() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": "Error processing image with OCR service",
                "details": "Invalid API key"
            })))
            .mount(&mock_server)
            .await;

        let err = uploader_for(&mock_server)
            .extract(small_upload(), |_| {})
            .await
            .unwrap_err();
        match err {
            UploadError::Relay {
                status,
                message,
                details,
            } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Error processing image with OCR service");
                assert_eq!(details.as_deref(), Some("Invalid API key"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_response_is_invalid() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&mock_server)
            .await;

        let err = uploader_for(&mock_server)
            .extract(small_upload(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidResponse { status: 200 }));
    }

    #[tokio::test]
    async fn test_slow_relay_times_out() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "text": "late" }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let err = uploader_for(&mock_server)
            .with_timeout(Duration::from_millis(100))
            .extract(small_upload(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::Timeout));
    }

    #[tokio::test]
    async fn test_session_clears_previous_outcome() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "text": "First" })),
            )
            .expect(2)
            .mount(&mock_server)
            .await;

        let mut session = UploadSession::new(uploader_for(&mock_server));
        let mut seen = Vec::new();
        session.submit(small_upload(), |p| seen.push(p)).await;
        assert_eq!(session.outcome().unwrap().as_ref().unwrap(), "First");
        assert_eq!(seen, vec![10, 20, 40, 70, 100]);
        assert_eq!(session.progress(), 100);

        // Rejected locally: the earlier text must not survive
        let bad = Upload::new(vec![1], "text/plain", "a.txt");
        let second = session.submit(bad, |_| {}).await;
        assert!(second.as_ref().is_err_and(|e| e.is_validation()));
        assert_eq!(session.progress(), 0);

        // Same image again goes to the network again
        session.submit(small_upload(), |_| {}).await;
        assert!(session.outcome().unwrap().is_ok());

        session.clear();
        assert!(session.outcome().is_none());
    }
}
