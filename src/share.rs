//! Shareable catalog links.
//!
//! A catalog is shared by packing its state into the `data` query parameter
//! of the viewer URL:
//!
//! ```text
//! SharePayload ──▶ JSON ──▶ DEFLATE ──▶ base64url ──▶ {base}?data={token}
//! ```
//!
//! The full payload carries every product field. When the link would exceed
//! the configured ceiling, products are packed as fixed-position arrays
//! ([`MinifiedProduct`]) and the viewer re-derives prices on restore. An
//! optional [`LinkShortener`] turns the long link into a short one.

use crate::assemble::new_product_id;
use crate::config::{CatalogConfig, DEFAULT_HEADER_LOGO, DEFAULT_TITLE};
use crate::error::{CatalogError, ShortenError};
use crate::output::{ProcessedProduct, ProductStatus};
use crate::pipeline::promotion;
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Query parameter carrying the token.
pub const SHARE_PARAM: &str = "data";

/// Decompressed payloads larger than this are rejected.
const MAX_DECODED_BYTES: u64 = 16 * 1024 * 1024;

/// Catalog state carried by a share link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharePayload {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub logo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub products: Option<Vec<ProcessedProduct>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minified_products: Option<Vec<MinifiedProduct>>,
}

impl SharePayload {
    /// Payload in the full form.
    pub fn new(title: &str, logo: &str, cover: Option<&str>, products: Vec<ProcessedProduct>) -> Self {
        Self {
            title: title.to_string(),
            logo: logo.to_string(),
            cover: cover.map(str::to_string),
            products: Some(products),
            minified_products: None,
        }
    }

    /// Same payload with products packed as arrays.
    pub fn minified(&self) -> Self {
        let minified = match (&self.products, &self.minified_products) {
            (Some(products), _) => minify(products),
            (None, Some(m)) => m.clone(),
            (None, None) => Vec::new(),
        };
        Self {
            title: self.title.clone(),
            logo: self.logo.clone(),
            cover: self.cover.clone(),
            products: None,
            minified_products: Some(minified),
        }
    }

    pub fn is_minified(&self) -> bool {
        self.products.is_none() && self.minified_products.is_some()
    }

    /// Title, or the default when the sender left it blank.
    pub fn title_or_default(&self) -> &str {
        if self.title.trim().is_empty() {
            DEFAULT_TITLE
        } else {
            &self.title
        }
    }

    /// Header logo, or the default when the sender left it blank.
    pub fn logo_or_default(&self) -> &str {
        if self.logo.trim().is_empty() {
            DEFAULT_HEADER_LOGO
        } else {
            &self.logo
        }
    }
}

/// Serialised positions of a minified product.
type MinifiedArray = (String, String, String, f64, String, String, String, String, String);

/// A product packed as
/// `[sku, name, nameAr, originalPrice, originalMechanics, discountLabelAr, imageUrl, logoUrl, productPageUrl]`.
///
/// Absent optional fields are empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MinifiedArray", into = "MinifiedArray")]
pub struct MinifiedProduct {
    pub sku: String,
    pub name: String,
    pub name_ar: String,
    pub original_price: f64,
    pub original_mechanics: String,
    pub discount_label_ar: String,
    pub image_url: String,
    pub logo_url: String,
    pub product_page_url: String,
}

impl From<MinifiedArray> for MinifiedProduct {
    fn from(a: MinifiedArray) -> Self {
        Self {
            sku: a.0,
            name: a.1,
            name_ar: a.2,
            original_price: a.3,
            original_mechanics: a.4,
            discount_label_ar: a.5,
            image_url: a.6,
            logo_url: a.7,
            product_page_url: a.8,
        }
    }
}

impl From<MinifiedProduct> for MinifiedArray {
    fn from(m: MinifiedProduct) -> Self {
        (
            m.sku,
            m.name,
            m.name_ar,
            m.original_price,
            m.original_mechanics,
            m.discount_label_ar,
            m.image_url,
            m.logo_url,
            m.product_page_url,
        )
    }
}

impl From<&ProcessedProduct> for MinifiedProduct {
    fn from(p: &ProcessedProduct) -> Self {
        Self {
            sku: p.sku.clone(),
            name: p.name.clone(),
            name_ar: p.name_ar.clone().unwrap_or_default(),
            original_price: p.original_price,
            original_mechanics: p.original_mechanics.clone(),
            discount_label_ar: p.discount_label_ar.clone().unwrap_or_default(),
            image_url: p.image_url.clone(),
            logo_url: p.logo_url.clone().unwrap_or_default(),
            product_page_url: p.product_page_url.clone().unwrap_or_default(),
        }
    }
}

pub fn minify(products: &[ProcessedProduct]) -> Vec<MinifiedProduct> {
    products.iter().map(MinifiedProduct::from).collect()
}

fn non_empty(s: &str) -> Option<String> {
    Some(s.to_string()).filter(|v| !v.trim().is_empty())
}

/// Rebuild a product from its packed form.
///
/// Final price and English label come from the promotion rules; the Arabic
/// label is kept as carried. Each restored product gets a fresh id.
pub fn restore_product(m: &MinifiedProduct, vat_rate: f64) -> ProcessedProduct {
    let outcome = promotion::resolve_with_vat(
        m.original_price,
        &m.original_mechanics,
        &m.discount_label_ar,
        None,
        vat_rate,
    );
    ProcessedProduct {
        id: new_product_id(),
        sku: m.sku.clone(),
        name: m.name.clone(),
        name_ar: non_empty(&m.name_ar),
        image_url: m.image_url.clone(),
        logo_url: non_empty(&m.logo_url),
        product_page_url: non_empty(&m.product_page_url),
        original_price: m.original_price,
        final_price: outcome.final_price,
        original_mechanics: m.original_mechanics.clone(),
        discount_label: outcome.discount_label,
        discount_label_ar: non_empty(&m.discount_label_ar),
        status: ProductStatus::Completed,
        error: None,
    }
    .with_price_status()
}

/// Re-establish the price and label guarantees on a product taken from a
/// link; the sender may not have upheld them.
fn normalize_product(mut p: ProcessedProduct, vat_rate: f64) -> ProcessedProduct {
    if !(p.final_price > 0.0 && p.final_price.is_finite()) {
        p.final_price = p.original_price;
    }
    if p.discount_label.trim().is_empty() {
        let outcome = promotion::resolve_with_vat(
            p.original_price,
            &p.original_mechanics,
            p.discount_label_ar.as_deref().unwrap_or_default(),
            None,
            vat_rate,
        );
        p.discount_label = outcome.discount_label;
        p.discount_label_ar = p.discount_label_ar.or(outcome.discount_label_ar);
    } else {
        p.discount_label = p.discount_label.trim().to_uppercase();
    }
    p.with_price_status()
}

/// Products carried by a payload, in either form.
///
/// # Errors
/// [`CatalogError::ShareStateInvalid`] when the payload carries no products.
pub fn restore(payload: &SharePayload, vat_rate: f64) -> Result<Vec<ProcessedProduct>, CatalogError> {
    if let Some(products) = &payload.products {
        return Ok(products
            .iter()
            .map(|p| normalize_product(p.clone(), vat_rate))
            .collect());
    }
    if let Some(minified) = &payload.minified_products {
        return Ok(minified.iter().map(|m| restore_product(m, vat_rate)).collect());
    }
    Err(CatalogError::ShareStateInvalid(
        "payload carries no products".into(),
    ))
}

// ── Token codec ──────────────────────────────────────────────────────────

/// JSON → DEFLATE → URL-safe base64 without padding.
pub fn encode_token(payload: &SharePayload) -> Result<String, CatalogError> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| CatalogError::Internal(format!("share payload serialisation: {e}")))?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(&json)
        .map_err(|e| CatalogError::Internal(format!("share payload compression: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| CatalogError::Internal(format!("share payload compression: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(compressed))
}

/// Inverse of [`encode_token`].
pub fn decode_token(token: &str) -> Result<SharePayload, CatalogError> {
    let compressed = URL_SAFE_NO_PAD
        .decode(token.trim().trim_end_matches('='))
        .map_err(|e| CatalogError::ShareStateInvalid(format!("not base64url: {e}")))?;
    let mut json = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(MAX_DECODED_BYTES)
        .read_to_end(&mut json)
        .map_err(|e| CatalogError::ShareStateInvalid(format!("not deflate data: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| CatalogError::ShareStateInvalid(format!("bad payload: {e}")))
}

/// `{base}?data={token}` (or `&data=` when the base already has a query).
pub fn share_url(base: &str, token: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{SHARE_PARAM}={token}")
}

/// Decode a full share link or a bare token.
pub fn parse_share_link(link_or_token: &str) -> Result<SharePayload, CatalogError> {
    let input = link_or_token.trim();
    let token = reqwest::Url::parse(input)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(k, _)| k == SHARE_PARAM)
                .map(|(_, v)| v.into_owned())
        });
    match token {
        Some(t) => decode_token(&t),
        None if input.contains("://") => Err(CatalogError::ShareStateInvalid(format!(
            "link has no '{SHARE_PARAM}' parameter"
        ))),
        None => decode_token(input),
    }
}

// ── Shortening ───────────────────────────────────────────────────────────

/// Turns a long share link into a short one.
#[async_trait]
pub trait LinkShortener: Send + Sync {
    async fn shorten(&self, long_url: &str) -> Result<String, ShortenError>;
}

/// GET `{endpoint}{url-encoded long url}`, reply body is the short link.
#[derive(Debug, Clone)]
pub struct HttpShortener {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpShortener {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| CatalogError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl LinkShortener for HttpShortener {
    async fn shorten(&self, long_url: &str) -> Result<String, ShortenError> {
        let url = format!("{}{}", self.endpoint, urlencoding::encode(long_url));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ShortenError(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ShortenError(format!("HTTP {}", response.status())));
        }
        let body = response.text().await.map_err(|e| ShortenError(e.to_string()))?;
        let short = body.trim();
        if !short.starts_with("http") {
            return Err(ShortenError(format!("unexpected reply: {short:.80}")));
        }
        Ok(short.to_string())
    }
}

// ── Link building ────────────────────────────────────────────────────────

/// Which payload form a link carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShareForm {
    Full,
    Minified,
}

/// A generated share link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLink {
    /// What to hand out: the short link when shortening worked.
    pub url: String,
    pub long_url: String,
    pub form: ShareForm,
    pub shortened: bool,
}

/// Build a share link for `payload`.
///
/// Prefers the full form; packs products when the full link is longer than
/// `config.max_share_url_len`. A shortener failure is logged and the long
/// link is used instead.
///
/// # Errors
/// [`CatalogError::ShareStateTooLarge`] when no short link is available and
/// even the packed link exceeds the ceiling.
pub async fn build_share_link(
    payload: &SharePayload,
    config: &CatalogConfig,
    shortener: Option<&dyn LinkShortener>,
) -> Result<ShareLink, CatalogError> {
    let limit = config.max_share_url_len;
    let base = config.share_base_url.as_str();

    let mut form = if payload.is_minified() {
        ShareForm::Minified
    } else {
        ShareForm::Full
    };
    let mut long_url = share_url(base, &encode_token(payload)?);
    if long_url.len() > limit && form == ShareForm::Full {
        debug!("Full share link is {} chars, packing products", long_url.len());
        long_url = share_url(base, &encode_token(&payload.minified())?);
        form = ShareForm::Minified;
    }

    if let Some(shortener) = shortener {
        match shortener.shorten(&long_url).await {
            Ok(short) => {
                info!("Share link shortened to {}", short);
                return Ok(ShareLink {
                    url: short,
                    long_url,
                    form,
                    shortened: true,
                });
            }
            Err(e) => warn!("{}; using the long link", e),
        }
    }

    if long_url.len() > limit {
        return Err(CatalogError::ShareStateTooLarge {
            len: long_url.len(),
            limit,
        });
    }

    info!("Share link ready ({} chars, {:?} form)", long_url.len(), form);
    Ok(ShareLink {
        url: long_url.clone(),
        long_url,
        form,
        shortened: false,
    })
}
