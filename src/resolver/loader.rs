//! Network side of image resolution.
//!
//! The state machine only decides *what* to fetch; an [`ImageLoader`] does
//! the fetching. [`HttpImageLoader`] mimics what a browser `<img>` element
//! would observe: a CORS-mode request only counts as loaded when the server
//! answers with a permissive `Access-Control-Allow-Origin`, and a body only
//! counts as an image when it sniffs as one (file-sharing services love to
//! answer 200 with an HTML interstitial).

use crate::config::CatalogConfig;
use crate::error::{CatalogError, ImageError};
use crate::resolver::machine::LoadRequest;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN};
use std::fmt::Display;
use std::time::Duration;
use tracing::debug;

/// Largest image body accepted, before any inlining.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Bytes of a successfully fetched image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Performs one fetch attempt for the resolver.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, request: &LoadRequest) -> Result<LoadedImage, ImageError>;
}

/// reqwest-backed loader.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
    origin: String,
    timeout_secs: u64,
}

impl HttpImageLoader {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.image_timeout_secs))
            .build()
            .map_err(|e| CatalogError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            origin: config.cors_origin.clone(),
            timeout_secs: config.image_timeout_secs,
        })
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, request: &LoadRequest) -> Result<LoadedImage, ImageError> {
        let url = request.url.as_str();
        let mut builder = self.client.get(url);
        if request.mode.is_cors() {
            builder = builder.header(ORIGIN, &self.origin);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ImageError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout_secs,
                }
            } else {
                ImageError::Transport {
                    url: url.to_string(),
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if request.mode.is_cors() {
            let allowed = response
                .headers()
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok())
                .map(|v| cors_allows(v, &self.origin))
                .unwrap_or(false);
            if !allowed {
                return Err(ImageError::CorsRejected {
                    url: url.to_string(),
                });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if response.content_length().is_some_and(|len| len > MAX_IMAGE_BYTES) {
            return Err(ImageError::TooLarge {
                url: url.to_string(),
                limit: MAX_IMAGE_BYTES,
            });
        }
        let bytes = read_capped(response.bytes_stream(), MAX_IMAGE_BYTES, url).await?;

        let mime_type = sniff_mime(&bytes, &content_type).ok_or_else(|| ImageError::NotAnImage {
            url: url.to_string(),
            content_type: content_type.clone(),
        })?;

        debug!("Fetched {} bytes ({}) from {}", bytes.len(), mime_type, url);
        Ok(LoadedImage { bytes, mime_type })
    }
}

/// Collect a body stream, failing as soon as it passes `limit` bytes.
async fn read_capped<S, B, E>(stream: S, limit: u64, url: &str) -> Result<Vec<u8>, ImageError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ImageError::Transport {
            url: url.to_string(),
            detail: e.to_string(),
        })?;
        body.extend_from_slice(chunk.as_ref());
        if body.len() as u64 > limit {
            return Err(ImageError::TooLarge {
                url: url.to_string(),
                limit,
            });
        }
    }
    Ok(body)
}

fn cors_allows(header: &str, origin: &str) -> bool {
    let header = header.trim();
    header == "*" || header.eq_ignore_ascii_case(origin)
}

/// MIME type of an image body, from its magic bytes or, failing that, an
/// `image/*` content type (SVG has no magic the sniffer knows).
pub fn sniff_mime(bytes: &[u8], content_type: &str) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format.to_mime_type().to_string());
    }
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("image/").then_some(essence)
}
