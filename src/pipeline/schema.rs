//! Column inference and row normalisation.
//!
//! Promotion sheets are hand-maintained: title banners above the header,
//! headers spelled a dozen ways, spacer rows, and a configuration row or two
//! mixed in with the products. [`SchemaMapper`] finds the header, resolves
//! each logical [`Field`] to a column by keyword, and extracts [`RawRow`]s
//! plus [`DirectiveValue`]s. Blank rows and unparsable prices are tolerated
//! silently; only missing required columns or an empty result are errors.

use crate::error::SchemaError;
use crate::pipeline::input::Cell;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Rows scanned for the header by default.
pub const DEFAULT_HEADER_SCAN_ROWS: usize = 20;

/// Tokens that identify the header row.
const HEADER_MARKERS: [&str; 3] = ["sku", "item code", "article"];

/// Cell separator used when searching a row for header markers, so a marker
/// can never straddle two cells.
const CELL_SEPARATOR: char = '\u{1f}';

static DIRECTIVE_TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").unwrap());

/// A logical column of the catalog schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    Sku,
    Name,
    NameAr,
    Price,
    FinalPrice,
    Mechanics,
    MechanicsAr,
    Image,
    Logo,
    Month,
    ProductPage,
}

impl Field {
    pub const ALL: [Field; 11] = [
        Field::Sku,
        Field::Name,
        Field::NameAr,
        Field::Price,
        Field::FinalPrice,
        Field::Mechanics,
        Field::MechanicsAr,
        Field::Image,
        Field::Logo,
        Field::Month,
        Field::ProductPage,
    ];

    /// Fields an upload cannot do without.
    pub const REQUIRED: [Field; 3] = [Field::Sku, Field::Name, Field::Price];

    pub fn label(self) -> &'static str {
        match self {
            Field::Sku => "SKU",
            Field::Name => "Name",
            Field::NameAr => "NameAr",
            Field::Price => "Price",
            Field::FinalPrice => "FinalPrice",
            Field::Mechanics => "Mechanics",
            Field::MechanicsAr => "MechanicsAr",
            Field::Image => "Image",
            Field::Logo => "Logo",
            Field::Month => "Month",
            Field::ProductPage => "ProductPage",
        }
    }

    /// Header keywords, any of which selects a column.
    pub fn synonyms(self) -> &'static [&'static str] {
        match self {
            Field::Sku => &["sku", "item code", "code", "article no"],
            Field::Name => &[
                "name",
                "product name",
                "description",
                "title",
                "item name",
                "english name",
                "name en",
            ],
            Field::NameAr => &["arabic name", "name arabic", "name ar", "ar name", "arabic"],
            Field::Price => &["price", "original price", "regular price", "rrp", "old price"],
            Field::FinalPrice => &["final price", "sale price", "new price", "discounted price"],
            Field::Mechanics => &["mechanics", "promo", "offer", "promotion", "details"],
            Field::MechanicsAr => &[
                "ar mechanics",
                "mechanics ar",
                "arabic mechanics",
                "promo ar",
                "arabic promo",
                "offer ar",
            ],
            Field::Image => &[
                "image", "images", "img", "picture", "photo", "url", "link", "web", "drive",
            ],
            Field::Logo => &["logo", "brand", "brand logo", "icon"],
            Field::Month => &["month", "campaign month", "period", "date", "time", "campaign"],
            Field::ProductPage => &[
                "product page",
                "product link",
                "product url",
                "page url",
                "page link",
            ],
        }
    }

    /// Header keywords that disqualify a column even if a synonym matched.
    pub fn exclusions(self) -> &'static [&'static str] {
        match self {
            Field::Mechanics => &["arabic", "ar", "name"],
            Field::MechanicsAr => &["name"],
            Field::Image => &[
                "logo",
                "brand",
                "icon",
                "product page",
                "product link",
                "product url",
                "page url",
                "page link",
            ],
            Field::NameAr => &["mechanics", "promo", "offer", "details"],
            _ => &[],
        }
    }

    /// True when the (lower-cased) header text selects this field.
    fn matches(self, header_lower: &str) -> bool {
        self.synonyms().iter().any(|k| header_lower.contains(k))
            && !self.exclusions().iter().any(|e| header_lower.contains(e))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Zero-based column index per field; `None` means absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalColumnMap {
    pub sku: Option<usize>,
    pub name: Option<usize>,
    pub name_ar: Option<usize>,
    pub price: Option<usize>,
    pub final_price: Option<usize>,
    pub mechanics: Option<usize>,
    pub mechanics_ar: Option<usize>,
    pub image: Option<usize>,
    pub logo: Option<usize>,
    pub month: Option<usize>,
    pub product_page: Option<usize>,
}

impl CanonicalColumnMap {
    /// Resolve every field against a header row. Leftmost match wins.
    pub fn from_headers(headers: &[String]) -> Self {
        let lowered: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let find = |field: Field| lowered.iter().position(|h| field.matches(h));
        Self {
            sku: find(Field::Sku),
            name: find(Field::Name),
            name_ar: find(Field::NameAr),
            price: find(Field::Price),
            final_price: find(Field::FinalPrice),
            mechanics: find(Field::Mechanics),
            mechanics_ar: find(Field::MechanicsAr),
            image: find(Field::Image),
            logo: find(Field::Logo),
            month: find(Field::Month),
            product_page: find(Field::ProductPage),
        }
    }

    pub fn get(&self, field: Field) -> Option<usize> {
        match field {
            Field::Sku => self.sku,
            Field::Name => self.name,
            Field::NameAr => self.name_ar,
            Field::Price => self.price,
            Field::FinalPrice => self.final_price,
            Field::Mechanics => self.mechanics,
            Field::MechanicsAr => self.mechanics_ar,
            Field::Image => self.image,
            Field::Logo => self.logo,
            Field::Month => self.month,
            Field::ProductPage => self.product_page,
        }
    }

    /// Labels of required fields that did not resolve, in schema order.
    pub fn missing_required(&self) -> Vec<&'static str> {
        Field::REQUIRED
            .iter()
            .filter(|f| self.get(**f).is_none())
            .map(|f| f.label())
            .collect()
    }
}

/// One product record after header mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub sku: String,
    pub name: String,
    pub name_ar: Option<String>,
    pub price: f64,
    pub final_price: Option<f64>,
    pub mechanics: String,
    pub mechanics_ar: Option<String>,
    pub image_ref: Option<String>,
    pub logo_ref: Option<String>,
    /// Raw month cell: text or a number (month index or date serial).
    pub month: Option<Cell>,
    pub product_page_url: Option<String>,
}

/// Catalog metadata carried by a configuration row instead of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "url")]
pub enum DirectiveValue {
    /// SKU `logo`: replaces the header logo.
    Logo(String),
    /// SKU `cover`: front-page cover art.
    Cover(String),
}

impl DirectiveValue {
    /// Recognise a directive SKU (trimmed, case-insensitive).
    fn kind(sku: &str) -> Option<fn(String) -> DirectiveValue> {
        match sku.trim().to_lowercase().as_str() {
            "logo" => Some(DirectiveValue::Logo),
            "cover" => Some(DirectiveValue::Cover),
            _ => None,
        }
    }
}

/// Result of mapping one sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetExtraction {
    pub columns: CanonicalColumnMap,
    pub header_row: usize,
    pub rows: Vec<RawRow>,
    pub directives: Vec<DirectiveValue>,
    /// Rows after the header, whatever became of them.
    pub data_rows: usize,
    pub directive_rows: usize,
    pub skipped_rows: usize,
    pub price_fallbacks: usize,
}

/// Header and column report without row extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInspection {
    pub header_row: usize,
    pub headers: Vec<String>,
    pub columns: CanonicalColumnMap,
    pub missing: Vec<&'static str>,
    pub data_rows: usize,
}

/// Maps loosely structured sheets onto the catalog schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaMapper {
    header_scan_rows: usize,
}

impl Default for SchemaMapper {
    fn default() -> Self {
        Self {
            header_scan_rows: DEFAULT_HEADER_SCAN_ROWS,
        }
    }
}

impl SchemaMapper {
    pub fn new(header_scan_rows: usize) -> Self {
        Self {
            header_scan_rows: header_scan_rows.max(1),
        }
    }

    /// Index of the first row mentioning a header marker; 0 if none does.
    pub fn detect_header(&self, rows: &[Vec<Cell>]) -> usize {
        rows.iter()
            .take(self.header_scan_rows)
            .position(|row| {
                let joined = row
                    .iter()
                    .map(|c| c.to_text().to_lowercase())
                    .collect::<Vec<_>>()
                    .join(&CELL_SEPARATOR.to_string());
                HEADER_MARKERS.iter().any(|m| joined.contains(m))
            })
            .unwrap_or(0)
    }

    /// Header detection and column resolution only.
    pub fn inspect(&self, rows: &[Vec<Cell>]) -> SheetInspection {
        let header_row = self.detect_header(rows);
        let headers = header_texts(rows.get(header_row));
        let columns = CanonicalColumnMap::from_headers(&headers);
        SheetInspection {
            header_row,
            missing: columns.missing_required(),
            headers,
            columns,
            data_rows: rows.len().saturating_sub(header_row + 1),
        }
    }

    /// Map a sheet to rows and directives.
    ///
    /// # Errors
    /// [`SchemaError::MissingColumns`] when SKU, Name or Price is absent;
    /// [`SchemaError::NoValidRows`] when no product row survives.
    pub fn map(&self, rows: &[Vec<Cell>]) -> Result<SheetExtraction, SchemaError> {
        let header_row = self.detect_header(rows);
        let headers = header_texts(rows.get(header_row));
        let columns = CanonicalColumnMap::from_headers(&headers);
        debug!("Header row {}: {:?}", header_row, headers);

        let missing = columns.missing_required();
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns { missing });
        }

        let mut extraction = SheetExtraction {
            columns,
            header_row,
            rows: Vec::new(),
            directives: Vec::new(),
            data_rows: 0,
            directive_rows: 0,
            skipped_rows: 0,
            price_fallbacks: 0,
        };

        for (offset, row) in rows.iter().skip(header_row + 1).enumerate() {
            extraction.data_rows += 1;
            let line = header_row + 2 + offset;
            let cols = &extraction.columns;
            let sku = text_at(row, cols.sku);

            if let Some(make) = DirectiveValue::kind(&sku) {
                extraction.directive_rows += 1;
                if let Some(url) = text_at_opt(row, cols.image).and_then(|v| first_token(&v)) {
                    debug!("Row {}: directive {} → {}", line, sku.trim(), url);
                    extraction.directives.push(make(url));
                }
                continue;
            }

            let name = text_at(row, cols.name);
            if sku.is_empty() || name.is_empty() {
                debug!("Row {}: skipped (blank SKU or Name)", line);
                extraction.skipped_rows += 1;
                continue;
            }

            let price = match cell_at(row, cols.price).and_then(parse_price) {
                Some(p) => p,
                None => {
                    debug!("Row {}: unparsable price, using 0", line);
                    extraction.price_fallbacks += 1;
                    0.0
                }
            };

            let raw = RawRow {
                sku,
                name,
                name_ar: text_at_opt(row, cols.name_ar),
                price,
                final_price: cell_at(row, cols.final_price).and_then(parse_price),
                mechanics: text_at(row, cols.mechanics),
                mechanics_ar: text_at_opt(row, cols.mechanics_ar),
                image_ref: text_at_opt(row, cols.image),
                logo_ref: text_at_opt(row, cols.logo),
                month: cell_at(row, cols.month).filter(|c| !c.is_blank()).cloned(),
                product_page_url: text_at_opt(row, cols.product_page),
            };
            extraction.rows.push(raw);
        }

        if extraction.rows.is_empty() {
            return Err(SchemaError::NoValidRows);
        }

        info!(
            "Mapped {} product rows ({} skipped, {} directives, {} price fallbacks)",
            extraction.rows.len(),
            extraction.skipped_rows,
            extraction.directive_rows,
            extraction.price_fallbacks
        );
        Ok(extraction)
    }
}

/// Map a sheet with the default header scan window.
pub fn map_rows(rows: &[Vec<Cell>]) -> Result<SheetExtraction, SchemaError> {
    SchemaMapper::default().map(rows)
}

fn header_texts(row: Option<&Vec<Cell>>) -> Vec<String> {
    row.map(|r| r.iter().map(|c| c.to_text().trim().to_string()).collect())
        .unwrap_or_default()
}

fn cell_at(row: &[Cell], idx: Option<usize>) -> Option<&Cell> {
    idx.and_then(|i| row.get(i))
}

fn text_at(row: &[Cell], idx: Option<usize>) -> String {
    cell_at(row, idx)
        .map(|c| c.to_text().trim().to_string())
        .unwrap_or_default()
}

fn text_at_opt(row: &[Cell], idx: Option<usize>) -> Option<String> {
    Some(text_at(row, idx)).filter(|s| !s.is_empty())
}

/// First non-empty comma/whitespace-separated token.
fn first_token(value: &str) -> Option<String> {
    DIRECTIVE_TOKEN_SPLIT
        .split(value)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

/// Parse a price cell.
///
/// Text keeps only digits and decimal points, then reads the longest numeric
/// prefix: `"SAR 1,299.50"` → 1299.5, `"1.2.3"` → 1.2. Returns `None` when
/// nothing numeric is left.
pub fn parse_price(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) if n.is_finite() => Some(n.abs()),
        Cell::Text(s) => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            numeric_prefix(&digits)
        }
        _ => None,
    }
}

/// Longest prefix of `s` of the form `digits[.digits]` parsed as f64.
pub(crate) fn numeric_prefix(s: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;
    for (i, c) in s.char_indices() {
        match c {
            '0'..='9' => {
                seen_digit = true;
                end = i + 1;
            }
            '.' if !seen_dot => {
                seen_dot = true;
                if seen_digit {
                    end = i + 1;
                }
            }
            _ => break,
        }
    }
    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}
