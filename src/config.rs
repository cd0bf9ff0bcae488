//! Configuration types for catalog building.
//!
//! All catalog behaviour is controlled through [`CatalogConfig`], built via
//! its [`CatalogConfigBuilder`]. Business constants that vary by region or
//! deployment (VAT rate, page size, share-link ceiling) live here rather than
//! inline in the pipeline stages that use them.

use crate::error::CatalogError;
use crate::progress::ProgressCallback;
use std::fmt;

/// VAT rate baked into spreadsheet prices (Saudi Arabia, 15 %).
pub const DEFAULT_VAT_RATE: f64 = 0.15;

/// Products per catalog page (3 × 2 grid).
pub const DEFAULT_PAGE_SIZE: usize = 6;

/// Title used when no month can be derived.
pub const DEFAULT_TITLE: &str = "Consumer Offer Plan";

/// Header logo shown until a `logo` directive row replaces it.
pub const DEFAULT_HEADER_LOGO: &str = "https://alhabibpharmacy.com/media/logo/stores/3/En-Logo.png";

/// Configuration for building a promotion catalog.
///
/// # Example
/// ```rust
/// use promo_catalog::CatalogConfig;
///
/// let config = CatalogConfig::builder()
///     .manual_month("July")
///     .image_concurrency(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.page_size, 6);
/// ```
#[derive(Clone)]
pub struct CatalogConfig {
    /// Products per page. Default: 6.
    pub page_size: usize,

    /// How many leading rows are scanned for the header. Default: 20.
    pub header_scan_rows: usize,

    /// VAT rate already included in spreadsheet prices. Default: 0.15.
    ///
    /// Percentage discounts are applied to the pre-VAT base and VAT is added
    /// back, so a 20 % discount on 115.00 lands on 92.00.
    pub vat_rate: f64,

    /// Campaign month typed by the operator; overrides any Month column.
    pub manual_month: Option<String>,

    /// Worksheet name. If None, the first sheet is used.
    pub sheet: Option<String>,

    /// Header logo used before any `logo` directive row is seen.
    pub default_logo: String,

    /// Concurrent image resolutions. Default: 8.
    pub image_concurrency: usize,

    /// Per-attempt image fetch timeout in seconds. Default: 30.
    pub image_timeout_secs: u64,

    /// Base URL of an image-rewriting proxy (e.g. `https://images.weserv.nl/`).
    ///
    /// When set, a proxied attempt is inserted between the credentialed and
    /// uncredentialed direct fetches. Default: None.
    pub proxy_base: Option<String>,

    /// Inline the first successfully fetched bytes as a `data:` URI. Default: false.
    pub inline_images: bool,

    /// `Origin` header sent on credentialed image fetches.
    pub cors_origin: String,

    /// Base URL the `data` share parameter is appended to.
    pub share_base_url: String,

    /// Longest share link accepted, in characters. Default: 8000.
    pub max_share_url_len: usize,

    /// Link shortener endpoint; the url-encoded long link is appended. Default: None.
    pub shortener_endpoint: Option<String>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives image-resolution progress and failure reports.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            header_scan_rows: 20,
            vat_rate: DEFAULT_VAT_RATE,
            manual_month: None,
            sheet: None,
            default_logo: DEFAULT_HEADER_LOGO.to_string(),
            image_concurrency: 8,
            image_timeout_secs: 30,
            proxy_base: None,
            inline_images: false,
            cors_origin: "http://localhost:5173".to_string(),
            share_base_url: "http://localhost:5173/".to_string(),
            max_share_url_len: 8000,
            shortener_endpoint: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("page_size", &self.page_size)
            .field("header_scan_rows", &self.header_scan_rows)
            .field("vat_rate", &self.vat_rate)
            .field("manual_month", &self.manual_month)
            .field("sheet", &self.sheet)
            .field("image_concurrency", &self.image_concurrency)
            .field("proxy_base", &self.proxy_base)
            .field("inline_images", &self.inline_images)
            .field("share_base_url", &self.share_base_url)
            .field("max_share_url_len", &self.max_share_url_len)
            .field("shortener_endpoint", &self.shortener_endpoint)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ResolutionProgressCallback>"),
            )
            .finish()
    }
}

impl CatalogConfig {
    /// Create a new builder for `CatalogConfig`.
    pub fn builder() -> CatalogConfigBuilder {
        CatalogConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`CatalogConfig`].
#[derive(Debug)]
pub struct CatalogConfigBuilder {
    config: CatalogConfig,
}

impl CatalogConfigBuilder {
    pub fn page_size(mut self, n: usize) -> Self {
        self.config.page_size = n;
        self
    }

    pub fn header_scan_rows(mut self, n: usize) -> Self {
        self.config.header_scan_rows = n.max(1);
        self
    }

    pub fn vat_rate(mut self, rate: f64) -> Self {
        self.config.vat_rate = rate;
        self
    }

    pub fn manual_month(mut self, month: impl Into<String>) -> Self {
        let month = month.into();
        self.config.manual_month = if month.trim().is_empty() {
            None
        } else {
            Some(month)
        };
        self
    }

    pub fn sheet(mut self, name: impl Into<String>) -> Self {
        self.config.sheet = Some(name.into());
        self
    }

    pub fn default_logo(mut self, url: impl Into<String>) -> Self {
        self.config.default_logo = url.into();
        self
    }

    pub fn image_concurrency(mut self, n: usize) -> Self {
        self.config.image_concurrency = n;
        self
    }

    pub fn image_timeout_secs(mut self, secs: u64) -> Self {
        self.config.image_timeout_secs = secs.max(1);
        self
    }

    pub fn proxy_base(mut self, base: impl Into<String>) -> Self {
        self.config.proxy_base = Some(base.into());
        self
    }

    pub fn inline_images(mut self, v: bool) -> Self {
        self.config.inline_images = v;
        self
    }

    pub fn cors_origin(mut self, origin: impl Into<String>) -> Self {
        self.config.cors_origin = origin.into();
        self
    }

    pub fn share_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.share_base_url = url.into();
        self
    }

    pub fn max_share_url_len(mut self, n: usize) -> Self {
        self.config.max_share_url_len = n;
        self
    }

    pub fn shortener_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.shortener_endpoint = Some(endpoint.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CatalogConfig, CatalogError> {
        let c = &self.config;
        if c.page_size == 0 {
            return Err(CatalogError::InvalidConfig("Page size must be ≥ 1".into()));
        }
        if c.image_concurrency == 0 {
            return Err(CatalogError::InvalidConfig(
                "Image concurrency must be ≥ 1".into(),
            ));
        }
        if !(0.0..1.0).contains(&c.vat_rate) {
            return Err(CatalogError::InvalidConfig(format!(
                "VAT rate must be in [0, 1), got {}",
                c.vat_rate
            )));
        }
        if c.share_base_url.trim().is_empty() {
            return Err(CatalogError::InvalidConfig(
                "Share base URL must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_print_layout() {
        let c = CatalogConfig::default();
        assert_eq!(c.page_size, 6);
        assert_eq!(c.header_scan_rows, 20);
        assert!((c.vat_rate - 0.15).abs() < f64::EPSILON);
        assert_eq!(c.max_share_url_len, 8000);
        assert!(c.proxy_base.is_none());
        assert!(!c.inline_images);
    }

    #[test]
    fn blank_manual_month_is_ignored() {
        let c = CatalogConfig::builder().manual_month("   ").build().unwrap();
        assert!(c.manual_month.is_none());
    }

    #[test]
    fn zero_page_size_rejected() {
        let err = CatalogConfig::builder().page_size(0).build().unwrap_err();
        assert!(err.to_string().contains("Page size"));
    }

    #[test]
    fn out_of_range_vat_rejected() {
        assert!(CatalogConfig::builder().vat_rate(1.15).build().is_err());
        assert!(CatalogConfig::builder().vat_rate(-0.1).build().is_err());
        assert!(CatalogConfig::builder().vat_rate(0.0).build().is_ok());
    }

    #[test]
    fn debug_hides_callback() {
        let c = CatalogConfig::builder()
            .progress_callback(std::sync::Arc::new(crate::progress::NoopProgressCallback))
            .build()
            .unwrap();
        let s = format!("{c:?}");
        assert!(s.contains("<dyn ResolutionProgressCallback>"));
    }
}
