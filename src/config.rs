//! Relay configuration, loaded once at startup from the environment.
//!
//! The OCR credential is the only required value. Everything else has a
//! default that matches a local development setup.

use std::fmt;

use axum::http::HeaderValue;

use thiserror::Error;
use tracing::{debug, warn};

use crate::ocr::OcrOptions;

pub const DEFAULT_UPSTREAM_URL: &str = "https://api.ocr.space/parse/image";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const API_KEY_VAR: &str = "OCR_SPACE_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OCR_SPACE_API_KEY is not set")]
    MissingApiKey,

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server-held OCR provider credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Returns `None` for empty or whitespace-only keys.
    pub fn new(key: impl Into<String>) -> Option<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Which origins may call the relay from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: Option<ApiKey>,
    /// Hostname or IP literal (IPv6 without brackets).
    pub host: String,
    pub port: u16,
    pub allowed_origins: AllowedOrigins,
    pub upstream_url: String,
    pub ocr: OcrOptions,
    pub max_upload_bytes: usize,
}

impl RelayConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env loaded: {}", e);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(API_KEY_VAR).and_then(ApiKey::new);

        let host = lookup("HOST")
            .map(|h| h.trim().trim_start_matches('[').trim_end_matches(']').to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let port: u16 = parse_var(&lookup, "PORT", 3000)?;

        let allowed_origins = match lookup("CORS_ALLOW_ORIGIN") {
            None => AllowedOrigins::Any,
            Some(raw) if raw.trim() == "*" || raw.trim().is_empty() => AllowedOrigins::Any,
            Some(raw) => {
                let origins: Vec<String> = raw
                    .split(',')
                    .map(|o| o.trim().trim_end_matches('/').to_string())
                    .filter(|o| !o.is_empty())
                    .collect();
                for origin in &origins {
                    if let Err(e) = HeaderValue::from_str(origin) {
                        return Err(ConfigError::Invalid {
                            var: "CORS_ALLOW_ORIGIN",
                            value: origin.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
                AllowedOrigins::List(origins)
            }
        };

        let upstream_url =
            lookup("OCR_SPACE_URL").unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
        if !upstream_url.starts_with("https://") {
            warn!("OCR_SPACE_URL is not HTTPS: {}", upstream_url);
        }

        let defaults = OcrOptions::default();
        let engine: u8 = parse_var(&lookup, "OCR_ENGINE", defaults.engine)?;
        if !(1..=2).contains(&engine) {
            return Err(ConfigError::Invalid {
                var: "OCR_ENGINE",
                value: engine.to_string(),
                reason: "expected 1 or 2".to_string(),
            });
        }
        let ocr = OcrOptions {
            language: lookup("OCR_LANGUAGE").unwrap_or(defaults.language),
            engine,
            detect_tables: parse_bool(&lookup, "OCR_DETECT_TABLES", defaults.detect_tables)?,
            ..defaults
        };

        let max_upload_bytes =
            parse_var(&lookup, "RELAY_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            api_key,
            host,
            port,
            allowed_origins,
            upstream_url,
            ocr,
            max_upload_bytes,
        })
    }

    /// Display form of the listen address, bracketing IPv6 literals.
    pub fn listen_url(&self) -> String {
        if self.host.contains(':') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// Fails when the credential is missing. The server calls this before binding.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(ConfigError::MissingApiKey),
        }
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn parse_bool<F>(lookup: &F, var: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw,
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}
