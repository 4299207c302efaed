//! Wire payloads exchanged between the uploader and the relay.

use serde::{Deserialize, Serialize};

/// Multipart field the uploader puts the image in.
pub const IMAGE_FIELD: &str = "image";

/// Body of every `/api/extract-text` response.
///
/// Success is `{ "text": ... }`, failure is `{ "error": ..., "details"?: ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtractionResponse {
    Text {
        text: String,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl ExtractionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn error(error: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            error: error.into(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shapes() {
        assert_eq!(
            serde_json::to_value(ExtractionResponse::text("hi")).unwrap(),
            json!({ "text": "hi" })
        );
        assert_eq!(
            serde_json::to_value(ExtractionResponse::error("bad", None)).unwrap(),
            json!({ "error": "bad" })
        );
        assert_eq!(
            serde_json::to_value(ExtractionResponse::error("bad", Some("why".into()))).unwrap(),
            json!({ "error": "bad", "details": "why" })
        );
    }

    #[test]
    fn test_error_body_is_not_mistaken_for_text() {
        let parsed: ExtractionResponse =
            serde_json::from_str(r#"{"error":"Upstream said no","details":"403"}"#).unwrap();
        assert_eq!(
            parsed,
            ExtractionResponse::error("Upstream said no", Some("403".into()))
        );
    }
}
