//! Progress-callback trait for image-resolution events.
//!
//! Inject an [`Arc<dyn ResolutionProgressCallback>`] via
//! [`crate::config::CatalogConfigBuilder::progress_callback`] to receive
//! events while catalog images are being resolved. The same hook is the host
//! debug channel: [`ResolutionProgressCallback::on_image_failed`] receives the
//! original reference and the extracted identifier for every non-logo image
//! that exhausted all fallback strategies.
//!
//! # Example
//!
//! ```rust
//! use promo_catalog::{CatalogConfig, FailureReport, ResolutionProgressCallback};
//! use std::sync::{Arc, Mutex};
//!
//! struct DebugSink {
//!     failures: Mutex<Vec<String>>,
//! }
//!
//! impl ResolutionProgressCallback for DebugSink {
//!     fn on_image_failed(&self, key: &str, report: &FailureReport) {
//!         self.failures.lock().unwrap().push(format!("{key}: {}", report.original_reference));
//!     }
//! }
//!
//! let sink = Arc::new(DebugSink { failures: Mutex::new(Vec::new()) });
//! let config = CatalogConfig::builder()
//!     .progress_callback(sink as Arc<dyn ResolutionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::resolver::machine::{FailureReport, Strategy};
use std::sync::Arc;

/// Called by the image resolver as each image settles.
///
/// Implementations must be `Send + Sync`: images resolve concurrently and
/// callbacks may fire from different tokio worker threads. All methods have
/// no-op defaults.
pub trait ResolutionProgressCallback: Send + Sync {
    /// Called once before any image is fetched.
    fn on_resolution_start(&self, total_images: usize) {
        let _ = total_images;
    }

    /// Called when an image instance starts its first attempt.
    fn on_image_start(&self, key: &str) {
        let _ = key;
    }

    /// Called when an image loaded through `strategy`.
    fn on_image_loaded(&self, key: &str, strategy: Strategy) {
        let _ = (key, strategy);
    }

    /// Called exactly once when a non-logo image exhausts every strategy.
    ///
    /// Logos degrade to their placeholder silently and never reach this hook.
    fn on_image_failed(&self, key: &str, report: &FailureReport) {
        let _ = (key, report);
    }

    /// Called once after every image has settled.
    fn on_resolution_complete(&self, total_images: usize, loaded: usize) {
        let _ = (total_images, loaded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ResolutionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CatalogConfig`].
pub type ProgressCallback = Arc<dyn ResolutionProgressCallback>;
