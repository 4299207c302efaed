//! OCR.space protocol types and response normalization.
//!
//! The relay talks to exactly one provider. This module holds the request
//! options sent with every call and the shape of what comes back; the HTTP
//! client itself lives in [`ocr_space`].

pub mod ocr_space;

use serde::Deserialize;

/// Returned instead of an empty string when no region yielded text.
pub const NO_TEXT_SENTINEL: &str = "No text could be extracted";

/// Separator between text regions (one per page/result).
const REGION_SEPARATOR: &str = "\n\n";

/// Recognition parameters forwarded with every upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    pub language: String,
    /// 1 = legacy engine, 2 = neural engine (slower, more accurate).
    pub engine: u8,
    pub detect_orientation: bool,
    pub detect_tables: bool,
    pub scale: bool,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            engine: 2,
            detect_orientation: true,
            detect_tables: true,
            scale: true,
        }
    }
}

impl OcrOptions {
    /// Text fields of the multipart form, in send order.
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("language", self.language.clone()),
            ("isOverlayRequired", "false".to_string()),
            ("scale", self.scale.to_string()),
            ("detectOrientation", self.detect_orientation.to_string()),
            ("isTable", self.detect_tables.to_string()),
            ("OCREngine", self.engine.to_string()),
            ("isCreateSearchablePdf", "false".to_string()),
            ("isSearchablePdfHideTextLayer", "true".to_string()),
        ]
    }
}

// ============================================================================
// Provider response
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OcrSpaceResponse {
    #[serde(default)]
    pub parsed_results: Option<Vec<ParsedResult>>,
    #[serde(default)]
    pub is_errored_on_processing: bool,
    #[serde(default)]
    pub error_message: Option<ErrorMessage>,
    #[serde(default)]
    pub error_details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParsedResult {
    #[serde(default)]
    pub parsed_text: Option<String>,
}

/// OCR.space sends either a single string or a list of strings here.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl ErrorMessage {
    pub fn joined(&self) -> String {
        match self {
            ErrorMessage::One(msg) => msg.clone(),
            ErrorMessage::Many(msgs) => msgs.join("; "),
        }
    }
}

impl OcrSpaceResponse {
    /// Human-readable reason for a processing failure, if the provider gave one.
    pub fn failure_reason(&self) -> Option<String> {
        let message = self
            .error_message
            .as_ref()
            .map(ErrorMessage::joined)
            .filter(|m| !m.trim().is_empty());
        let details = match &self.error_details {
            Some(serde_json::Value::String(d)) => Some(d.clone()),
            Some(serde_json::Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        }
        .filter(|d| !d.trim().is_empty());
        match (message, details) {
            (Some(m), Some(d)) => Some(format!("{} ({})", m, d)),
            (Some(m), None) => Some(m),
            (None, d) => d,
        }
    }

    /// Joined, trimmed text of all regions (see [`normalize_text`]).
    pub fn text(&self) -> String {
        normalize_text(self.parsed_results.as_deref().unwrap_or_default())
    }
}

/// Join every non-empty region with a blank line.
///
/// Line endings are normalized to `\n` and each region is trimmed. Never
/// returns an empty string: [`NO_TEXT_SENTINEL`] stands in for "nothing found".
pub fn normalize_text(results: &[ParsedResult]) -> String {
    let regions: Vec<String> = results
        .iter()
        .filter_map(|r| r.parsed_text.as_deref())
        .map(|t| t.replace("\r\n", "\n").trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if regions.is_empty() {
        NO_TEXT_SENTINEL.to_string()
    } else {
        regions.join(REGION_SEPARATOR)
    }
}
