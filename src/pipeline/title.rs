//! Campaign title derivation.
//!
//! A month token (typed by the operator or read from the sheet) becomes
//! `"Consumer Offer Plan {Month} (COP-{n})"`. Numbers 1–12 are month indices;
//! larger numbers are spreadsheet date serials; text is matched against full
//! or three-letter month names.

use crate::config::DEFAULT_TITLE;
use crate::pipeline::input::Cell;
use crate::pipeline::schema::numeric_prefix;
use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

static MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)January|February|March|April|May|June|July|August|September|October|November|December")
        .unwrap()
});

static COP_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(COP-(\d+)\)").unwrap());

/// Day zero of the spreadsheet serial calendar.
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Zero-based month index for a token, if one can be derived.
pub fn month_index(value: &Cell) -> Option<usize> {
    match value {
        Cell::Number(n) => month_from_number(*n).or_else(|| month_from_text(&value.to_text())),
        Cell::Text(s) => {
            let s = s.trim();
            leading_number(s)
                .and_then(month_from_number)
                .or_else(|| month_from_text(s))
        }
        Cell::Bool(_) | Cell::Empty => None,
    }
}

fn month_from_number(n: f64) -> Option<usize> {
    if !n.is_finite() || n < 1.0 {
        return None;
    }
    if n <= 12.0 {
        return Some(n.trunc() as usize - 1);
    }
    let days = i64::try_from(n.floor() as i128).ok()?;
    serial_epoch()
        .checked_add_signed(Duration::try_days(days)?)
        .map(|d| d.month0() as usize)
}

fn month_from_text(s: &str) -> Option<usize> {
    let upper = s.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }
    MONTHS.iter().position(|m| {
        let full = m.to_uppercase();
        upper.contains(&full) || upper.contains(&full[..3]) || full.starts_with(&upper)
    })
}

/// Leading numeric value of a text token (`"5"`, `"05 promo"`, `"-3"`).
fn leading_number(s: &str) -> Option<f64> {
    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, s.strip_prefix('+').unwrap_or(s)),
    };
    numeric_prefix(rest).map(|n| sign * n)
}

/// Title for an optional month token.
pub fn campaign_title(month: Option<&Cell>) -> String {
    let Some(value) = month.filter(|v| !v.is_blank()) else {
        return DEFAULT_TITLE.to_string();
    };
    if matches!(value, Cell::Number(n) if *n == 0.0) {
        return DEFAULT_TITLE.to_string();
    }

    if let Some(idx) = month_index(value) {
        return format!("{DEFAULT_TITLE} {} (COP-{})", MONTHS[idx], idx + 1);
    }

    let text = value.to_text();
    let text = text.trim();
    if text.chars().count() > 2 {
        return format!("{DEFAULT_TITLE} {}", capitalize(text));
    }
    DEFAULT_TITLE.to_string()
}

/// Title from the manual month if given, else the first non-blank month cell.
pub fn derive_title<'a>(manual_month: Option<&str>, row_months: impl IntoIterator<Item = Option<&'a Cell>>) -> String {
    if let Some(manual) = manual_month.map(str::trim).filter(|m| !m.is_empty()) {
        return campaign_title(Some(&Cell::Text(manual.to_string())));
    }
    let first = row_months.into_iter().flatten().find(|c| !c.is_blank());
    campaign_title(first)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    }
}

/// A run of title text; month names are highlighted by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleSegment {
    pub text: String,
    pub highlight: bool,
}

/// Split a title around month names.
pub fn title_segments(title: &str) -> Vec<TitleSegment> {
    let mut segments = Vec::new();
    let mut last = 0;
    for m in MONTH_NAME.find_iter(title) {
        if m.start() > last {
            segments.push(TitleSegment {
                text: title[last..m.start()].to_string(),
                highlight: false,
            });
        }
        segments.push(TitleSegment {
            text: m.as_str().to_string(),
            highlight: true,
        });
        last = m.end();
    }
    if last < title.len() || segments.is_empty() {
        segments.push(TitleSegment {
            text: title[last..].to_string(),
            highlight: false,
        });
    }
    segments
}

/// File name for the captured document.
pub fn capture_filename(title: &str) -> String {
    match COP_NUMBER.captures(title) {
        Some(c) => format!("Promo Magazine COP-{}.pdf", &c[1]),
        None => "Promo Magazine.pdf".to_string(),
    }
}
