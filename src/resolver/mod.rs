//! Resilient remote-image resolution.
//!
//! * [`machine`] — the pure fallback state machine
//! * [`loader`]  — the fetch seam and its reqwest implementation
//! * [`task`]    — drivers: inline resolution and spawned, resettable handles
//!
//! The functions here apply the drivers to a whole [`Catalog`]: collect every
//! header, cover, product and brand-logo reference, resolve them with bounded
//! concurrency, and write the results back.

pub mod loader;
pub mod machine;
pub mod task;

pub use loader::{HttpImageLoader, ImageLoader, LoadedImage};
pub use machine::{
    transition, AccessMode, AttemptToken, FailureReport, ImageResolutionState, ImageRole,
    LoadRequest, Phase, ResolutionEvent, ResolutionPlan, Strategy,
};
pub use task::{ImageHandle, ImageOutcome, ImageResolver};

use crate::output::Catalog;
use futures::StreamExt;
use std::collections::HashMap;
use tracing::info;

/// Key of the header logo image.
pub const HEADER_LOGO_KEY: &str = "header-logo";
/// Key of the cover image.
pub const COVER_KEY: &str = "cover";

/// Key of a product's main image.
pub fn product_image_key(product_id: &str) -> String {
    format!("product:{product_id}:image")
}

/// Key of a product's brand logo.
pub fn product_logo_key(product_id: &str) -> String {
    format!("product:{product_id}:logo")
}

/// One image of a catalog waiting to be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageJob {
    pub key: String,
    pub reference: String,
    pub role: ImageRole,
}

/// Every non-empty image reference in `catalog`, in document order.
pub fn collect_image_jobs(catalog: &Catalog) -> Vec<ImageJob> {
    let mut jobs = Vec::new();
    let mut push = |key: String, reference: &str, role: ImageRole| {
        if !reference.trim().is_empty() {
            jobs.push(ImageJob {
                key,
                reference: reference.to_string(),
                role,
            });
        }
    };

    push(HEADER_LOGO_KEY.to_string(), &catalog.header_logo, ImageRole::Logo);
    if let Some(cover) = &catalog.cover {
        push(COVER_KEY.to_string(), cover, ImageRole::Cover);
    }
    for product in catalog.products() {
        push(product_image_key(&product.id), &product.image_url, ImageRole::Product);
        if let Some(logo) = &product.logo_url {
            push(product_logo_key(&product.id), logo, ImageRole::Logo);
        }
    }
    jobs
}

/// Resolve every image of `catalog`, at most `concurrency` at a time.
///
/// Outcomes are returned in completion order.
pub async fn resolve_catalog_images(
    catalog: &Catalog,
    resolver: &ImageResolver,
    concurrency: usize,
) -> Vec<ImageOutcome> {
    let jobs = collect_image_jobs(catalog);
    let total = jobs.len();
    info!("Resolving {} catalog images (concurrency {})", total, concurrency);
    if let Some(cb) = resolver.callback() {
        cb.on_resolution_start(total);
    }

    let outcomes: Vec<ImageOutcome> = crate::stream::resolve_jobs(jobs, resolver.clone(), concurrency)
        .collect()
        .await;

    let loaded = outcomes.iter().filter(|o| o.is_loaded()).count();
    info!("Image resolution complete: {}/{} loaded", loaded, total);
    if let Some(cb) = resolver.callback() {
        cb.on_resolution_complete(total, loaded);
    }
    outcomes
}

/// Rewrite `catalog` to the resolved URLs.
///
/// Failed images become empty strings so the renderer draws the role
/// placeholder; references without an outcome are left untouched.
pub fn apply_resolutions(catalog: &mut Catalog, outcomes: &[ImageOutcome]) {
    let by_key: HashMap<&str, &ImageOutcome> = outcomes.iter().map(|o| (o.key.as_str(), o)).collect();
    let resolved = |key: &str| -> Option<String> {
        by_key
            .get(key)
            .map(|o| o.resolved_url.clone().unwrap_or_default())
    };

    if let Some(url) = resolved(HEADER_LOGO_KEY) {
        catalog.header_logo = url;
    }
    if let Some(url) = resolved(COVER_KEY) {
        catalog.cover = Some(url).filter(|u| !u.is_empty());
    }
    for page in &mut catalog.pages {
        for product in &mut page.products {
            if let Some(url) = resolved(&product_image_key(&product.id)) {
                product.image_url = url;
            }
            if let Some(url) = resolved(&product_logo_key(&product.id)) {
                product.logo_url = Some(url).filter(|u| !u.is_empty());
            }
        }
    }
}
