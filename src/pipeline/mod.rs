//! Pipeline stages for spreadsheet-to-catalog conversion.
//!
//! Each submodule implements one transformation step. All of them except
//! [`input`] are pure and synchronous.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ schema ──▶ links ──▶ promotion ──▶ title / badge
//! (xlsx/csv) (columns)  (drive→cdn) (price+label)  (render model)
//! ```
//!
//! 1. [`input`]     — resolve a path or URL to a local file and read its rows;
//!    blocking readers run in `spawn_blocking`
//! 2. [`schema`]    — find the header row, map columns to canonical fields,
//!    extract rows and directive rows
//! 3. [`links`]     — normalise shared-drive links to CDN URLs
//! 4. [`promotion`] — derive final price and bilingual discount label
//! 5. [`title`]     — campaign title from a month token
//! 6. [`badge`]     — per-product card view model for the renderer
//!
//! [`encode`] turns fetched image bytes into `data:` URIs for the resolver.

pub mod badge;
pub mod encode;
pub mod input;
pub mod links;
pub mod promotion;
pub mod schema;
pub mod title;
