//! Inline image encoding: fetched bytes → base64 `data:` URI.
//!
//! Capture surfaces re-fetch every image they rasterise; an inlined image
//! can't go stale or lose its CORS headers between resolution and capture.

use crate::resolver::loader::LoadedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Encode a fetched image as a `data:` URI.
pub fn to_data_uri(image: &LoadedImage) -> String {
    let b64 = STANDARD.encode(&image.bytes);
    debug!("Inlined image → {} bytes base64", b64.len());
    format!("data:{};base64,{}", image.mime_type, b64)
}

/// True for references that are already inlined.
pub fn is_data_uri(reference: &str) -> bool {
    reference.trim_start().starts_with("data:")
}
