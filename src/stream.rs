//! Streaming image-resolution API: emit outcomes as images settle.
//!
//! [`crate::resolver::resolve_catalog_images`] waits for every image; use
//! [`resolve_stream`] to update a progress display or start writing results
//! while slow fallbacks are still running. Outcomes arrive in completion
//! order, not document order.

use crate::output::Catalog;
use crate::resolver::{collect_image_jobs, ImageJob, ImageOutcome, ImageResolver};
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of settled images.
pub type OutcomeStream = Pin<Box<dyn Stream<Item = ImageOutcome> + Send>>;

/// Resolve every image of `catalog`, yielding each outcome as it settles.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use promo_catalog::{build_catalog, resolve_stream, CatalogConfig, ImageResolver};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = CatalogConfig::default();
/// let output = build_catalog("offers.xlsx", &config).await?;
/// let resolver = ImageResolver::from_config(&config)?;
/// let mut images = resolve_stream(&output.catalog, &resolver, config.image_concurrency);
/// while let Some(img) = images.next().await {
///     println!("{} → {}", img.key, img.display());
/// }
/// # Ok(())
/// # }
/// ```
pub fn resolve_stream(catalog: &Catalog, resolver: &ImageResolver, concurrency: usize) -> OutcomeStream {
    let jobs = collect_image_jobs(catalog);
    info!("Streaming resolution of {} images", jobs.len());
    resolve_jobs(jobs, resolver.clone(), concurrency)
}

pub(crate) fn resolve_jobs(jobs: Vec<ImageJob>, resolver: ImageResolver, concurrency: usize) -> OutcomeStream {
    let s = stream::iter(jobs.into_iter().map(move |job| {
        let resolver = resolver.clone();
        async move { resolver.resolve(&job.key, &job.reference, job.role).await }
    }))
    .buffer_unordered(concurrency.max(1));

    Box::pin(s)
}
