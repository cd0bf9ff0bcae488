//! # promo-catalog
//!
//! Turn loosely structured product spreadsheets into paginated, print-ready
//! promotion catalogs.
//!
//! Merchandisers keep offers in whatever sheet layout they like: banner rows
//! above the header, columns in any order, prices typed as `"SAR 1,299.50"`,
//! image links pasted from a file-sharing service. This crate maps such a
//! sheet onto a strict schema, derives discount labels and final prices from
//! the free-text mechanics, and resolves every image through an ordered chain
//! of fallback endpoints so the finished document renders without holes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! spreadsheet
//!  │
//!  ├─ 1. Input      resolve local file or download from URL; xlsx/ods/csv
//!  ├─ 2. Schema     header detection, fuzzy column mapping, directive rows
//!  ├─ 3. Links      shared-drive links → canonical CDN URLs
//!  ├─ 4. Promotion  mechanics → final price + English/Arabic label
//!  ├─ 5. Assemble   title, pagination (6 per page), session state
//!  ├─ 6. Images     per-image fallback state machine (optional, concurrent)
//!  └─ 7. Output     catalog JSON, share link, captured document
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use promo_catalog::{build_catalog, CatalogConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CatalogConfig::builder().manual_month("May").build()?;
//!     let output = build_catalog("offers.xlsx", &config).await?;
//!     println!("{}: {} products on {} pages",
//!         output.catalog.title,
//!         output.stats.products,
//!         output.stats.pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `promo-catalog` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! promo-catalog = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod resolver;
pub mod share;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{
    build_catalog, build_catalog_from_rows, build_catalog_sync, build_catalog_to_file, create_product,
    export_document, inspect, inspect_with, paginate, resolve_output_images, write_output, CatalogSession, DocumentCapture,
    CAPTURE_REGION_ID,
};
pub use config::{CatalogConfig, CatalogConfigBuilder, DEFAULT_VAT_RATE};
pub use error::{CaptureError, CatalogError, ImageError, SchemaError, ShortenError};
pub use output::{Catalog, CatalogOutput, CatalogPage, CatalogStats, ProcessedProduct, ProductStatus};
pub use pipeline::badge::{ProductCard, PromoBadge};
pub use pipeline::input::Cell;
pub use pipeline::schema::{CanonicalColumnMap, DirectiveValue, RawRow, SchemaMapper, SheetExtraction};
pub use progress::{NoopProgressCallback, ProgressCallback, ResolutionProgressCallback};
pub use resolver::{
    apply_resolutions, resolve_catalog_images, FailureReport, HttpImageLoader, ImageHandle, ImageLoader,
    ImageOutcome, ImageResolver, ImageRole, Strategy,
};
pub use share::{
    build_share_link, parse_share_link, HttpShortener, LinkShortener, MinifiedProduct, ShareLink, SharePayload,
};
pub use stream::resolve_stream;
