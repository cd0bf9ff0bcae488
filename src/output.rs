//! Output types produced by catalog building.
//!
//! Field names serialise in camelCase so a catalog written by the CLI can be
//! handed straight to a JavaScript rendering surface.

use crate::pipeline::schema::CanonicalColumnMap;
use crate::pipeline::title::TitleSegment;
use crate::resolver::ImageOutcome;
use serde::{Deserialize, Serialize};

/// Lifecycle of a catalog entry as shown by the rendering surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Pending,
    Loading,
    #[default]
    Completed,
    Error,
}

/// A catalog-ready product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedProduct {
    /// Opaque, unique per creation; never reused.
    pub id: String,
    pub sku: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_ar: Option<String>,
    /// Normalised image URL; empty when the row had none.
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_page_url: Option<String>,
    pub original_price: f64,
    pub final_price: f64,
    /// Mechanics text as typed in the sheet; kept for traceability.
    #[serde(default)]
    pub original_mechanics: String,
    pub discount_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_label_ar: Option<String>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessedProduct {
    /// Flag a product whose price could not be established.
    ///
    /// `finalPrice` only falls to zero when `originalPrice` itself is zero,
    /// so a zero here means the sheet carried no usable price at all.
    pub(crate) fn with_price_status(mut self) -> Self {
        if self.final_price > 0.0 {
            self.status = ProductStatus::Completed;
            self.error = None;
        } else {
            self.status = ProductStatus::Error;
            self.error = Some(format!("No usable price for SKU {}", self.sku));
        }
        self
    }
}

/// One printed page of products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    /// 1-based page number.
    pub number: usize,
    pub products: Vec<ProcessedProduct>,
}

/// Everything the rendering surface needs to lay out the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub title: String,
    pub title_segments: Vec<TitleSegment>,
    pub header_logo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
    pub pages: Vec<CatalogPage>,
    /// Restored from a share link; editor tools are hidden.
    #[serde(default)]
    pub viewer_mode: bool,
}

impl Catalog {
    /// Products in catalog order across all pages.
    pub fn products(&self) -> impl Iterator<Item = &ProcessedProduct> {
        self.pages.iter().flat_map(|p| p.products.iter())
    }

    pub fn product_count(&self) -> usize {
        self.pages.iter().map(|p| p.products.len()).sum()
    }
}

/// Counters from one build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    /// Zero-based index of the detected header row.
    pub header_row: usize,
    /// Rows after the header, including skipped and directive rows.
    pub data_rows: usize,
    pub products: usize,
    pub pages: usize,
    pub directive_rows: usize,
    /// Rows dropped for a blank SKU or Name.
    pub skipped_rows: usize,
    /// Price cells that could not be parsed and were coerced to 0.
    pub price_fallbacks: usize,
    /// Products flagged with `status = error`.
    pub error_products: usize,
    pub images_total: usize,
    pub images_loaded: usize,
    pub total_duration_ms: u64,
}

/// Complete result of [`crate::build_catalog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOutput {
    pub catalog: Catalog,
    pub columns: CanonicalColumnMap,
    pub stats: CatalogStats,
    /// Per-image outcomes when image resolution ran.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageOutcome>,
}
