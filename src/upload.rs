//! The transient upload: bytes plus what the sender said they are.

use std::path::Path;

/// Extensions OCR.space accepts for the `file` part.
const UPSTREAM_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "pdf"];
const FALLBACK_EXTENSION: &str = "png";

#[derive(Debug, Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    /// Declared MIME type, e.g. `image/png`.
    pub mime_type: String,
    pub filename: String,
}

impl Upload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            filename: filename.into(),
        }
    }

    /// Read a file from disk, declaring its type from the extension or, failing that, its content.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime_type = mime_from_extension(path)
            .or_else(|| sniff_mime(&bytes))
            .unwrap_or("application/octet-stream");
        Ok(Self::new(bytes, mime_type, filename))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Bare MIME type without parameters, lower-cased.
    pub fn essence(&self) -> String {
        self.mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
    }

    /// Extension used for the provider call; unknown types fall back to `png`.
    pub fn upstream_extension(&self) -> &'static str {
        let essence = self.essence();
        let subtype = essence.rsplit('/').next().unwrap_or_default();
        UPSTREAM_EXTENSIONS
            .iter()
            .copied()
            .find(|ext| *ext == subtype)
            .unwrap_or(FALLBACK_EXTENSION)
    }

    pub fn upstream_filename(&self) -> String {
        format!("image.{}", self.upstream_extension())
    }
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    use image::ImageFormat;

    let mime = match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        _ => return None,
    };
    Some(mime)
}
