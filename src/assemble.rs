//! Catalog assembly and the top-level entry points.
//!
//! [`CatalogSession`] is the application state the rendering surface reads
//! from: products accumulated across uploads, the campaign title, header and
//! cover art, and whether the catalog was opened from a share link. The
//! `build_*` functions wrap one session around one spreadsheet for callers
//! that just want a catalog out of a file.

use crate::config::{CatalogConfig, DEFAULT_TITLE};
use crate::error::{CatalogError, CaptureError};
use crate::output::{Catalog, CatalogOutput, CatalogPage, CatalogStats, ProcessedProduct, ProductStatus};
use crate::pipeline::input::{self, SheetRows};
use crate::pipeline::links::convert_link;
use crate::pipeline::promotion;
use crate::pipeline::schema::{DirectiveValue, RawRow, SchemaMapper, SheetExtraction, SheetInspection};
use crate::pipeline::title::{capture_filename, derive_title, title_segments};
use crate::resolver::{apply_resolutions, resolve_catalog_images, ImageResolver};
use crate::share::{self, SharePayload};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// DOM id of the laid-out region handed to the capture collaborator.
pub const CAPTURE_REGION_ID: &str = "magazine-content";

/// Fresh opaque product id.
pub(crate) fn new_product_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Turn one mapped row into a catalog product.
pub fn create_product(row: &RawRow, vat_rate: f64) -> ProcessedProduct {
    let outcome = promotion::resolve_with_vat(
        row.price,
        &row.mechanics,
        row.mechanics_ar.as_deref().unwrap_or_default(),
        row.final_price,
        vat_rate,
    );
    ProcessedProduct {
        id: new_product_id(),
        sku: row.sku.clone(),
        name: row.name.clone(),
        name_ar: row.name_ar.clone(),
        image_url: convert_link(row.image_ref.as_deref().unwrap_or_default()),
        logo_url: row
            .logo_ref
            .as_deref()
            .map(convert_link)
            .filter(|u| !u.is_empty()),
        product_page_url: row.product_page_url.clone(),
        original_price: row.price,
        final_price: outcome.final_price,
        original_mechanics: row.mechanics.clone(),
        discount_label: outcome.discount_label,
        discount_label_ar: outcome.discount_label_ar,
        status: ProductStatus::Completed,
        error: None,
    }
    .with_price_status()
}

/// Chunk products into pages of `page_size`, preserving order.
pub fn paginate(products: &[ProcessedProduct], page_size: usize) -> Vec<CatalogPage> {
    products
        .chunks(page_size.max(1))
        .enumerate()
        .map(|(i, chunk)| CatalogPage {
            number: i + 1,
            products: chunk.to_vec(),
        })
        .collect()
}

/// Explicit application state for one catalog.
#[derive(Debug, Clone)]
pub struct CatalogSession {
    products: Vec<ProcessedProduct>,
    title: String,
    header_logo: String,
    cover: Option<String>,
    viewer_mode: bool,
    page_size: usize,
    vat_rate: f64,
    default_title: String,
    default_logo: String,
}

impl CatalogSession {
    pub fn new(config: &CatalogConfig) -> Self {
        let default_title = DEFAULT_TITLE.to_string();
        Self {
            products: Vec::new(),
            title: default_title.clone(),
            header_logo: config.default_logo.clone(),
            cover: None,
            viewer_mode: false,
            page_size: config.page_size,
            vat_rate: config.vat_rate,
            default_title,
            default_logo: config.default_logo.clone(),
        }
    }

    /// Append the products of one upload.
    ///
    /// The title is re-derived from this upload alone; directive rows replace
    /// the header logo or cover. Returns the number of products added.
    pub fn load(&mut self, extraction: &SheetExtraction, manual_month: Option<&str>) -> usize {
        self.title = derive_title(manual_month, extraction.rows.iter().map(|r| r.month.as_ref()));

        for directive in &extraction.directives {
            match directive {
                DirectiveValue::Logo(url) => {
                    let url = convert_link(url);
                    if !url.is_empty() {
                        debug!("Header logo set from sheet: {}", url);
                        self.header_logo = url;
                    }
                }
                DirectiveValue::Cover(url) => {
                    let url = convert_link(url);
                    if !url.is_empty() {
                        debug!("Cover set from sheet: {}", url);
                        self.cover = Some(url);
                    }
                }
            }
        }

        let vat = self.vat_rate;
        let before = self.products.len();
        self.products
            .extend(extraction.rows.iter().map(|row| create_product(row, vat)));
        self.viewer_mode = false;

        let added = self.products.len() - before;
        info!("Loaded {} products, catalog now holds {}", added, self.products.len());
        added
    }

    /// Back to an empty catalog with default title and logo.
    pub fn clear(&mut self) {
        self.products.clear();
        self.title = self.default_title.clone();
        self.header_logo = self.default_logo.clone();
        self.cover = None;
        self.viewer_mode = false;
    }

    /// Replace the catalog with shared state and enter viewer mode.
    pub fn restore(&mut self, payload: &SharePayload) -> Result<usize, CatalogError> {
        let products = share::restore(payload, self.vat_rate)?;
        self.title = payload.title_or_default().to_string();
        self.header_logo = payload.logo_or_default().to_string();
        self.cover = payload.cover.clone().filter(|c| !c.trim().is_empty());
        self.products = products;
        self.viewer_mode = true;
        info!("Restored {} shared products", self.products.len());
        Ok(self.products.len())
    }

    /// Paginated snapshot for rendering.
    pub fn catalog(&self) -> Catalog {
        Catalog {
            title: self.title.clone(),
            title_segments: title_segments(&self.title),
            header_logo: self.header_logo.clone(),
            cover: self.cover.clone(),
            pages: paginate(&self.products, self.page_size),
            viewer_mode: self.viewer_mode,
        }
    }

    pub fn share_payload(&self) -> SharePayload {
        SharePayload::new(
            &self.title,
            &self.header_logo,
            self.cover.as_deref(),
            self.products.clone(),
        )
    }

    pub fn products(&self) -> &[ProcessedProduct] {
        &self.products
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn header_logo(&self) -> &str {
        &self.header_logo
    }

    pub fn is_viewer_mode(&self) -> bool {
        self.viewer_mode
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Build a catalog from a spreadsheet file or URL.
///
/// Images are not fetched; see [`resolve_output_images`].
///
/// # Errors
/// Fatal problems only: unreadable input, missing required columns, or no
/// product rows. Blank rows and unparsable prices are tolerated and counted
/// in `output.stats`.
pub async fn build_catalog(input_str: impl AsRef<str>, config: &CatalogConfig) -> Result<CatalogOutput, CatalogError> {
    let start = Instant::now();
    let input_str = input_str.as_ref();
    info!("Building catalog from {}", input_str);

    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let rows = input::read_sheet(resolved.path(), config.sheet.as_deref()).await?;
    debug!("Read {} rows", rows.len());

    let mut output = build_catalog_from_rows(&rows, config)?;
    output.stats.total_duration_ms = start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Build a catalog from rows already in memory.
pub fn build_catalog_from_rows(rows: &SheetRows, config: &CatalogConfig) -> Result<CatalogOutput, CatalogError> {
    let start = Instant::now();
    let extraction = SchemaMapper::new(config.header_scan_rows).map(rows)?;

    let mut session = CatalogSession::new(config);
    session.load(&extraction, config.manual_month.as_deref());
    let catalog = session.catalog();

    let stats = CatalogStats {
        header_row: extraction.header_row,
        data_rows: extraction.data_rows,
        products: catalog.product_count(),
        pages: catalog.pages.len(),
        directive_rows: extraction.directive_rows,
        skipped_rows: extraction.skipped_rows,
        price_fallbacks: extraction.price_fallbacks,
        error_products: session
            .products()
            .iter()
            .filter(|p| p.status == ProductStatus::Error)
            .count(),
        images_total: 0,
        images_loaded: 0,
        total_duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Catalog '{}': {} products on {} pages",
        catalog.title, stats.products, stats.pages
    );
    Ok(CatalogOutput {
        catalog,
        columns: extraction.columns,
        stats,
        images: Vec::new(),
    })
}

/// Resolve every image of a built catalog and rewrite it in place.
pub async fn resolve_output_images(output: &mut CatalogOutput, resolver: &ImageResolver, concurrency: usize) {
    let outcomes = resolve_catalog_images(&output.catalog, resolver, concurrency).await;
    apply_resolutions(&mut output.catalog, &outcomes);
    output.stats.images_total = outcomes.len();
    output.stats.images_loaded = outcomes.iter().filter(|o| o.is_loaded()).count();
    output.images = outcomes;
}

/// Build a catalog and write it as JSON.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn build_catalog_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &CatalogConfig,
) -> Result<CatalogStats, CatalogError> {
    let output = build_catalog(input_str, config).await?;
    write_output(&output, output_path).await?;
    Ok(output.stats)
}

/// Write a catalog as pretty JSON, atomically.
pub async fn write_output(output: &CatalogOutput, path: impl AsRef<Path>) -> Result<(), CatalogError> {
    let json = serde_json::to_vec_pretty(output)
        .map_err(|e| CatalogError::Internal(format!("catalog serialisation: {e}")))?;
    write_atomic(path.as_ref(), &json).await
}

/// Synchronous wrapper around [`build_catalog`].
///
/// Creates a temporary tokio runtime internally.
pub fn build_catalog_sync(input_str: impl AsRef<str>, config: &CatalogConfig) -> Result<CatalogOutput, CatalogError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CatalogError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(build_catalog(input_str, config))
}

/// Report header row and column mapping without building a catalog.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<SheetInspection, CatalogError> {
    inspect_with(input_str, &CatalogConfig::default()).await
}

/// [`inspect`] honouring the sheet name, scan window and download timeout.
pub async fn inspect_with(input_str: impl AsRef<str>, config: &CatalogConfig) -> Result<SheetInspection, CatalogError> {
    let resolved = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let rows = input::read_sheet(resolved.path(), config.sheet.as_deref()).await?;
    Ok(SchemaMapper::new(config.header_scan_rows).inspect(&rows))
}

// ── Document export ──────────────────────────────────────────────────────

/// External collaborator that rasterises the laid-out catalog region.
#[async_trait]
pub trait DocumentCapture: Send + Sync {
    async fn capture(&self, region_id: &str, catalog: &Catalog) -> Result<Vec<u8>, CaptureError>;
}

/// Capture `catalog` and write it to `out_dir` as `capture_filename(title)`.
///
/// Returns the written path.
pub async fn export_document(
    catalog: &Catalog,
    capture: &dyn DocumentCapture,
    out_dir: impl AsRef<Path>,
) -> Result<PathBuf, CatalogError> {
    let path = out_dir.as_ref().join(capture_filename(&catalog.title));
    info!("Capturing '{}' to {}", CAPTURE_REGION_ID, path.display());
    let bytes = capture.capture(CAPTURE_REGION_ID, catalog).await?;
    write_atomic(&path, &bytes).await?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CatalogError> {
    let write_err = |e| CatalogError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    tokio::fs::write(&tmp_path, bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)
}
