//! HTTP surface of the relay.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, Method},
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::{AllowedOrigins, RelayConfig};
use crate::error::RelayError;
use crate::ocr::ocr_space::OcrSpaceClient;
use crate::schema::{ExtractionResponse, IMAGE_FIELD};
use crate::upload::Upload;

/// Accepted in place of [`IMAGE_FIELD`].
const IMAGE_FIELD_ALIAS: &str = "file";

/// Read-only state shared by all requests.
#[derive(Clone)]
pub struct AppState {
    /// `None` when the relay was started without a credential.
    ocr: Option<OcrSpaceClient>,
}

impl AppState {
    pub fn from_config(config: &RelayConfig) -> Self {
        let ocr = config.api_key.clone().map(|key| {
            OcrSpaceClient::new(
                reqwest::Client::new(),
                config.upstream_url.clone(),
                key,
                config.ocr.clone(),
            )
        });
        Self { ocr }
    }
}

/// Build the relay router with CORS, tracing and the upload size limit applied.
pub fn router(config: &RelayConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/extract-text", post(extract_text))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins))
        .with_state(AppState::from_config(config))
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            // Origins are checked when the config is loaded
            let values: Vec<HeaderValue> = list.iter().filter_map(|o| o.parse().ok()).collect();
            layer
                .allow_origin(AllowOrigin::list(values))
                .allow_credentials(true)
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// Relay one uploaded image to the OCR provider.
async fn extract_text(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractionResponse>, RelayError> {
    let request_id = Uuid::new_v4();
    let span = info_span!("extract_text", %request_id);

    async move {
        debug!("received");

        let ocr = state.ocr.as_ref().ok_or_else(|| {
            RelayError::Configuration("OCR_SPACE_API_KEY is not set".to_string())
        })?;

        let multipart = multipart.map_err(|e| RelayError::Multipart {
            status: e.status(),
            message: e.body_text(),
        })?;
        let upload = read_image(multipart).await?;
        info!(
            "validated: {} ({} bytes, {})",
            upload.filename,
            upload.len(),
            upload.mime_type
        );

        info!("forwarded to {}", ocr.endpoint());
        let result = ocr.parse_image(&upload).await;
        match &result {
            Ok(text) => info!("success: {} chars", text.len()),
            Err(RelayError::Transport(e)) => info!("transport_error: {}", e),
            Err(e) => info!("upstream_error: {}", e),
        }

        let text = result?;
        debug!("responded");
        Ok(Json(ExtractionResponse::text(text)))
    }
    .instrument(span)
    .await
}

/// Pull the first non-empty image file out of the form. Plain text parts don't count.
async fn read_image(mut multipart: Multipart) -> Result<Upload, RelayError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| RelayError::Multipart {
            status: e.status(),
            message: e.body_text(),
        })?
    {
        let name = field.name().unwrap_or_default();
        if name != IMAGE_FIELD && name != IMAGE_FIELD_ALIAS {
            debug!("ignoring field {:?}", name);
            continue;
        }

        let Some(filename) = field.file_name().map(str::to_string) else {
            debug!("ignoring non-file part {:?}", name);
            continue;
        };
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| RelayError::Multipart {
            status: e.status(),
            message: e.body_text(),
        })?;

        if !bytes.is_empty() {
            return Ok(Upload::new(bytes.to_vec(), mime_type, filename));
        }
    }

    Err(RelayError::MissingFile)
}
