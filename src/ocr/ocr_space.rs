//! OCR.space client (https://ocr.space/ocrapi).

use axum::http::StatusCode;
use reqwest::multipart::{Form, Part};
use tracing::{debug, info, warn};

use super::{OcrOptions, OcrSpaceResponse};
use crate::config::ApiKey;
use crate::error::RelayError;
use crate::upload::Upload;

const MAX_DETAIL_CHARS: usize = 500;

/// Forwards uploads to OCR.space. Cheap to clone.
#[derive(Clone)]
pub struct OcrSpaceClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: ApiKey,
    options: OcrOptions,
}

impl OcrSpaceClient {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        api_key: ApiKey,
        options: OcrOptions,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            options,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one image for recognition and return its normalized text.
    ///
    /// Exactly one request is made; failures are returned, never retried.
    pub async fn parse_image(&self, upload: &Upload) -> Result<String, RelayError> {
        let filename = upload.upstream_filename();
        info!(
            "OcrSpaceClient: sending {} ({} bytes, declared {})",
            filename,
            upload.len(),
            upload.mime_type
        );

        let form = self
            .options
            .form_fields()
            .into_iter()
            .fold(Form::new().part("file", file_part(upload)), |form, (name, value)| {
                form.text(name, value)
            });

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", self.api_key.expose())
            .multipart(form)
            .send()
            .await
            .map_err(RelayError::Transport)?;

        let status = to_status(response.status());
        let body = response.text().await.map_err(RelayError::Transport)?;
        debug!(
            "OcrSpaceClient: {} response ({} bytes): {}",
            status,
            body.len(),
            truncate(&body, MAX_DETAIL_CHARS)
        );

        if !status.is_success() {
            return Err(RelayError::Upstream {
                status,
                details: error_details(&body),
            });
        }

        let parsed: OcrSpaceResponse = serde_json::from_str(&body).map_err(|e| {
            warn!("OcrSpaceClient: unparseable response: {}", e);
            RelayError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                details: Some(format!(
                    "Invalid response from OCR service: {}",
                    truncate(&body, 200)
                )),
            }
        })?;

        if parsed.is_errored_on_processing {
            return Err(RelayError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                details: Some(
                    parsed
                        .failure_reason()
                        .unwrap_or_else(|| "Error processing image".to_string()),
                ),
            });
        }

        let text = parsed.text();
        info!("OcrSpaceClient: extracted {} chars", text.len());
        Ok(text)
    }
}

/// The image part; an unparseable declared type is dropped rather than failing the call.
fn file_part(upload: &Upload) -> Part {
    let part = || Part::bytes(upload.bytes.clone()).file_name(upload.upstream_filename());
    part().mime_str(&upload.essence()).unwrap_or_else(|_| part())
}

/// reqwest and axum sit on different `http` major versions.
fn to_status(status: reqwest::StatusCode) -> StatusCode {
    StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

/// Best diagnostic the provider gave in an error body.
fn error_details(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    if let Ok(parsed) = serde_json::from_str::<OcrSpaceResponse>(body) {
        if let Some(reason) = parsed.failure_reason() {
            return Some(reason);
        }
    }
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(body) {
        for key in ["error", "message", "ErrorMessage"] {
            if let Some(serde_json::Value::String(msg)) = map.get(key) {
                return Some(msg.clone());
            }
        }
    }
    Some(truncate(body, MAX_DETAIL_CHARS).to_string())
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
