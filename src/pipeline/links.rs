//! Shared-drive link normalisation.
//!
//! Spreadsheet authors paste image references in every shape a file-sharing
//! service can produce: `file/d/<id>/view` links, `open?id=<id>` links, bare
//! identifiers, or the already-direct CDN form. [`convert_link`] folds the
//! drive-related ones onto the canonical CDN form and leaves everything else
//! alone. The URL builders here are also used by the image resolver when it
//! falls back to alternate endpoints.

use once_cell::sync::Lazy;
use regex::Regex;

/// Canonical direct-access form; the identifier is appended.
pub const CDN_PREFIX: &str = "https://lh3.googleusercontent.com/d/";

/// A run of 25 or more URL-safe characters.
static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-A-Za-z0-9_]{25,}").unwrap());

/// Substrings that mark a candidate as part of a URL rather than an id.
const URL_FRAGMENTS: [&str; 4] = ["google", "drive", "http", "www"];

/// First run of 25+ URL-safe characters in `reference`, if any.
pub fn extract_identifier(reference: &str) -> Option<&str> {
    IDENTIFIER_RE.find(reference).map(|m| m.as_str())
}

/// Like [`extract_identifier`], but rejects candidates that swallowed part
/// of a URL (a long path segment containing `google`, `drive`, ...).
pub fn extract_drive_id(reference: &str) -> Option<&str> {
    extract_identifier(reference).filter(|id| !URL_FRAGMENTS.iter().any(|f| id.contains(f)))
}

fn is_cdn_form(url: &str) -> bool {
    url.contains("lh3.googleusercontent.com/d/")
}

/// Normalise a raw image reference.
///
/// Total: never fails, falls back to the trimmed input.
///
/// ```rust
/// use promo_catalog::pipeline::links::convert_link;
///
/// let id = "1AbCdEfGhIjKlMnOpQrStUvWxYz012345";
/// assert_eq!(
///     convert_link(&format!("https://drive.google.com/file/d/{id}/view?usp=sharing")),
///     format!("https://lh3.googleusercontent.com/d/{id}")
/// );
/// assert_eq!(convert_link("https://cdn.shop.com/p/1.jpg"), "https://cdn.shop.com/p/1.jpg");
/// assert_eq!(convert_link("   "), "");
/// ```
pub fn convert_link(raw: &str) -> String {
    let clean = raw.trim();
    if clean.is_empty() {
        return String::new();
    }
    if is_cdn_form(clean) {
        return clean.to_string();
    }

    let looks_like_url = clean.contains("http") || clean.contains("www.");
    let looks_like_drive = clean.contains("google") || clean.contains("drive");
    if looks_like_url && !looks_like_drive {
        return clean.to_string();
    }

    match extract_drive_id(clean) {
        Some(id) => cdn_url(id),
        None => clean.to_string(),
    }
}

/// `https://lh3.googleusercontent.com/d/{id}`
pub fn cdn_url(id: &str) -> String {
    format!("{CDN_PREFIX}{id}")
}

/// Thumbnail endpoint at 1000 px width with a cache-busting token.
pub fn thumbnail_url(id: &str, cache_buster: &str) -> String {
    format!("https://drive.google.com/thumbnail?id={id}&sz=w1000&t={cache_buster}")
}

/// Export-view endpoint with a cache-busting token.
pub fn export_url(id: &str, cache_buster: &str) -> String {
    format!("https://drive.google.com/uc?export=view&id={id}&t={cache_buster}")
}

/// Route `reference` through an image-rewriting proxy, re-encoded as JPEG.
pub fn proxy_url(base: &str, reference: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!(
        "{base}{sep}url={}&output=jpg",
        urlencoding::encode(reference)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz012345";

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(convert_link(""), "");
        assert_eq!(convert_link(" \n "), "");
    }

    #[test]
    fn cdn_form_passes_through() {
        let url = format!("  {CDN_PREFIX}{ID}  ");
        assert_eq!(convert_link(&url), format!("{CDN_PREFIX}{ID}"));
    }

    #[test]
    fn foreign_urls_are_untouched() {
        // Long path segment would otherwise look like an id.
        let url = "https://images.example.com/products/abcdefghijklmnopqrstuvwxyz0123.png";
        assert_eq!(convert_link(url), url);
        assert_eq!(convert_link("www.shop.sa/x.jpg"), "www.shop.sa/x.jpg");
    }

    #[test]
    fn drive_link_shapes_convert() {
        for raw in [
            format!("https://drive.google.com/file/d/{ID}/view?usp=sharing"),
            format!("https://drive.google.com/open?id={ID}"),
            format!("https://drive.google.com/uc?export=view&id={ID}"),
            ID.to_string(),
        ] {
            assert_eq!(convert_link(&raw), cdn_url(ID), "input: {raw}");
        }
    }

    #[test]
    fn drive_link_without_id_passes_through_trimmed() {
        assert_eq!(
            convert_link(" https://drive.google.com/short "),
            "https://drive.google.com/short"
        );
    }

    #[test]
    fn candidate_containing_url_fragment_is_rejected() {
        assert_eq!(extract_drive_id("xx_googleusercontent_yyyyyyyyyy"), None);
        assert_eq!(extract_drive_id(ID), Some(ID));
    }

    #[test]
    fn generic_extraction_takes_first_run() {
        let raw = format!("https://drive.google.com/file/d/{ID}/view");
        assert_eq!(extract_identifier(&raw), Some(ID));
        assert_eq!(extract_identifier("short-id"), None);
    }

    #[test]
    fn endpoint_builders() {
        assert_eq!(
            thumbnail_url(ID, "42"),
            format!("https://drive.google.com/thumbnail?id={ID}&sz=w1000&t=42")
        );
        assert_eq!(
            export_url(ID, "42"),
            format!("https://drive.google.com/uc?export=view&id={ID}&t=42")
        );
        assert_eq!(
            proxy_url("https://images.weserv.nl/", "https://a.co/x.png?s=1"),
            "https://images.weserv.nl/?url=https%3A%2F%2Fa.co%2Fx.png%3Fs%3D1&output=jpg"
        );
    }
}
