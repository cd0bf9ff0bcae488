//! Promotion pricing: free-text mechanics → display label + final price.
//!
//! Rules are tried in a fixed order and the first match wins. Order matters
//! because the patterns overlap: "50% off the 2nd item" is a second-item
//! deal, not a flat 50 % discount.
//!
//! | # | Mechanics contain                 | Final price            | Label                   |
//! |---|-----------------------------------|------------------------|-------------------------|
//! | 1 | `2nd` / `second`                  | unchanged              | `{p}% OFF ON 2ND ITEM`  |
//! | 2 | `{p}% off` / `discount` / `save`  | VAT-aware discount     | `{p}% OFF`              |
//! | 3 | `1+1` / `buy 1 get 1`             | unchanged              | `1+1 FREE`              |
//! | 4 | `2+1` / `buy 2 get 1`             | unchanged              | `2+1 FREE`              |
//! | 5 | `now` / `for` / `at` + number     | that number            | mechanics               |
//! | 6 | anything else                     | unchanged              | mechanics               |
//!
//! An explicit final price from the sheet skips the rules entirely.

use crate::config::DEFAULT_VAT_RATE;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%").unwrap());
static FLAT_PERCENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)%\s*(?:off|discount|save)").unwrap());
static FIXED_PRICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:now|for|at)\s*(\d+(?:\.\d+)?)").unwrap());
static BUY_N_GET_ONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)buy\s+(\d+)\s+get\s*1").unwrap());

/// Labels longer than this are candidates for compression.
const LONG_LABEL_CHARS: usize = 15;

pub const LABEL_FALLBACK: &str = "SPECIAL OFFER";
pub const LABEL_FALLBACK_AR: &str = "عرض خاص";
pub const BOGO_AR: &str = "١+١ مجاناً";
pub const BUY_TWO_AR: &str = "٢+١ مجاناً";
const FREE_AR: &str = "مجاناً";
const OFF_AR: &str = "خصم";

/// Result of resolving one product's promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionOutcome {
    pub final_price: f64,
    /// Upper-cased, never empty.
    pub discount_label: String,
    pub discount_label_ar: Option<String>,
}

/// Resolve with the default VAT rate.
pub fn resolve(
    original_price: f64,
    mechanics: &str,
    mechanics_ar: &str,
    explicit_final_price: Option<f64>,
) -> PromotionOutcome {
    resolve_with_vat(
        original_price,
        mechanics,
        mechanics_ar,
        explicit_final_price,
        DEFAULT_VAT_RATE,
    )
}

/// Resolve a promotion. Pure and deterministic.
///
/// `vat_rate` is the VAT already included in `original_price`; percentage
/// discounts are applied to the pre-VAT base and VAT is added back.
pub fn resolve_with_vat(
    original_price: f64,
    mechanics: &str,
    mechanics_ar: &str,
    explicit_final_price: Option<f64>,
    vat_rate: f64,
) -> PromotionOutcome {
    let mechanics = mechanics.trim();
    let mut arabic = Some(mechanics_ar.trim().to_string()).filter(|s| !s.is_empty());

    let (mut final_price, mut label) = match explicit_final_price.filter(|p| *p > 0.0) {
        Some(p) => (p, mechanics.to_string()),
        None => apply_rules(original_price, mechanics, &mut arabic, vat_rate),
    };

    if !(final_price > 0.0 && final_price.is_finite()) {
        final_price = original_price;
    }

    if label.chars().count() > LONG_LABEL_CHARS && !label.contains('%') {
        if let Some(n) = BUY_N_GET_ONE.captures(&label).map(|c| c[1].to_string()) {
            label = format!("{n}+1 FREE");
        }
    }

    if label.trim().is_empty() {
        label = LABEL_FALLBACK.to_string();
        arabic.get_or_insert_with(|| LABEL_FALLBACK_AR.to_string());
    }

    let label = label.trim().to_uppercase();
    if arabic.is_none() {
        arabic = transliterate(&label);
    }

    PromotionOutcome {
        final_price,
        discount_label: label,
        discount_label_ar: arabic,
    }
}

fn apply_rules(
    original_price: f64,
    mechanics: &str,
    arabic: &mut Option<String>,
    vat_rate: f64,
) -> (f64, String) {
    let lower = mechanics.to_lowercase();

    if lower.contains("2nd") || lower.contains("second") {
        let percent = PERCENT
            .captures(&lower)
            .map(|c| trim_leading_zeros(&c[1]))
            .unwrap_or_else(|| "50".to_string());
        arabic.get_or_insert_with(|| format!("خصم {percent}% على القطعة الثانية"));
        return (original_price, format!("{percent}% OFF ON 2ND ITEM"));
    }

    if let Some(caps) = FLAT_PERCENT.captures(&lower) {
        let percent = trim_leading_zeros(&caps[1]);
        let p: f64 = percent.parse().unwrap_or(f64::INFINITY);
        arabic.get_or_insert_with(|| format!("خصم {percent}%"));
        return (vat_aware_discount(original_price, p, vat_rate), format!("{percent}% OFF"));
    }

    if lower.contains("1+1") || lower.contains("buy 1 get 1") {
        arabic.get_or_insert_with(|| BOGO_AR.to_string());
        return (original_price, "1+1 FREE".to_string());
    }

    if lower.contains("2+1") || lower.contains("buy 2 get 1") {
        arabic.get_or_insert_with(|| BUY_TWO_AR.to_string());
        return (original_price, "2+1 FREE".to_string());
    }

    if let Some(price) = FIXED_PRICE
        .captures(&lower)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        return (price, mechanics.to_string());
    }

    (original_price, mechanics.to_string())
}

/// Discount the pre-VAT base, then add VAT back.
pub fn vat_aware_discount(original_price: f64, percent: f64, vat_rate: f64) -> f64 {
    let factor = 1.0 + vat_rate;
    let before_vat = original_price / factor;
    let after_discount = before_vat * (100.0 - percent) / 100.0;
    after_discount * factor
}

/// Last-resort Arabic label from the English one; first occurrence only.
fn transliterate(label: &str) -> Option<String> {
    if label.contains("FREE") {
        Some(label.replacen("FREE", FREE_AR, 1))
    } else if label.contains("OFF") {
        Some(label.replacen("OFF", OFF_AR, 1))
    } else {
        None
    }
}

fn trim_leading_zeros(digits: &str) -> String {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() { "0" } else { trimmed }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn scenario_a_vat_aware_percentage() {
        let out = resolve(100.0, "20% OFF", "", None);
        assert!(approx(out.final_price, 80.0), "got {}", out.final_price);
        assert_eq!(out.discount_label, "20% OFF");
        assert_eq!(out.discount_label_ar.as_deref(), Some("خصم 20%"));
    }

    #[test]
    fn scenario_b_buy_one_get_one() {
        let out = resolve(50.0, "Buy 1 Get 1", "", None);
        assert_eq!(out.final_price, 50.0);
        assert_eq!(out.discount_label, "1+1 FREE");
        assert_eq!(out.discount_label_ar.as_deref(), Some("١+١ مجاناً"));
    }

    #[test]
    fn vat_rate_is_a_parameter() {
        let out = resolve_with_vat(105.0, "10% discount", "", None, 0.05);
        assert!(approx(out.final_price, 94.5));
        let zero = resolve_with_vat(100.0, "25% save", "", None, 0.0);
        assert!(approx(zero.final_price, 75.0));
    }

    #[test]
    fn second_item_beats_percentage() {
        let out = resolve(40.0, "30% off on the 2nd item", "", None);
        assert_eq!(out.final_price, 40.0);
        assert_eq!(out.discount_label, "30% OFF ON 2ND ITEM");
        assert_eq!(
            out.discount_label_ar.as_deref(),
            Some("خصم 30% على القطعة الثانية")
        );
    }

    #[test]
    fn second_item_defaults_to_fifty() {
        let out = resolve(40.0, "Second piece half price", "", None);
        assert_eq!(out.discount_label, "50% OFF ON 2ND ITEM");
    }

    #[test]
    fn buy_two_get_one() {
        let out = resolve(30.0, "2+1", "", None);
        assert_eq!(out.discount_label, "2+1 FREE");
        assert_eq!(out.discount_label_ar.as_deref(), Some("٢+١ مجاناً"));
    }

    #[test]
    fn fixed_price_phrase() {
        let out = resolve(60.0, "Now 45.5", "", None);
        assert_eq!(out.final_price, 45.5);
        assert_eq!(out.discount_label, "NOW 45.5");
        assert_eq!(out.discount_label_ar, None);
    }

    #[test]
    fn supplied_arabic_wins() {
        let out = resolve(100.0, "20% off", "خصم خاص", None);
        assert_eq!(out.discount_label_ar.as_deref(), Some("خصم خاص"));
    }

    #[test]
    fn explicit_final_price_skips_rules() {
        let out = resolve(100.0, "20% off", "", Some(70.0));
        assert_eq!(out.final_price, 70.0);
        assert_eq!(out.discount_label, "20% OFF");
        // No rule ran; transliteration fills in the Arabic.
        assert_eq!(out.discount_label_ar.as_deref(), Some("20% خصم"));
    }

    #[test]
    fn zero_explicit_final_price_is_ignored() {
        let out = resolve(100.0, "20% off", "", Some(0.0));
        assert!(approx(out.final_price, 80.0));
    }

    #[test]
    fn non_positive_result_falls_back_to_original() {
        let out = resolve(100.0, "150% off", "", None);
        assert_eq!(out.final_price, 100.0);
        let out = resolve(100.0, "for 0", "", None);
        assert_eq!(out.final_price, 100.0);
    }

    #[test]
    fn long_buy_phrase_is_compressed() {
        let out = resolve(20.0, "Buy 3 Get 1 on all brands", "", None);
        assert_eq!(out.discount_label, "3+1 FREE");
        assert_eq!(out.discount_label_ar.as_deref(), Some("3+1 مجاناً"));

        // Typed without a space before the trailing word.
        let out = resolve(20.0, "Buy 1 Get 1Free on all items", "", Some(15.0));
        assert_eq!(out.discount_label, "1+1 FREE");
        assert_eq!(out.final_price, 15.0);
    }

    #[test]
    fn fallback_label_is_raw_mechanics_upper_cased() {
        let out = resolve(20.0, "  Exclusive bundle ", "", None);
        assert_eq!(out.discount_label, "EXCLUSIVE BUNDLE");
        assert_eq!(out.final_price, 20.0);
        assert_eq!(out.discount_label_ar, None);
    }

    #[test]
    fn empty_mechanics_get_a_label() {
        let out = resolve(20.0, "", "", None);
        assert_eq!(out.discount_label, LABEL_FALLBACK);
        assert_eq!(out.discount_label_ar.as_deref(), Some(LABEL_FALLBACK_AR));
    }

    #[test]
    fn transliteration_replaces_first_occurrence() {
        let out = resolve(20.0, "Free gift, free delivery", "", None);
        assert_eq!(
            out.discount_label_ar.as_deref(),
            Some("مجاناً GIFT, FREE DELIVERY")
        );
    }

    proptest! {
        #[test]
        fn deterministic(price in 0.0f64..10_000.0, mech in ".{0,40}", ar in ".{0,10}", fp in prop::option::of(0.0f64..500.0)) {
            let a = resolve(price, &mech, &ar, fp);
            let b = resolve(price, &mech, &ar, fp);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn final_price_positive_for_positive_prices(
            price in 0.01f64..10_000.0,
            mech in prop_oneof![
                ".{0,30}",
                "[0-9]{1,3}% (off|discount|save)",
                "(now|for|at) [0-9]{1,4}(\\.[0-9]{1,2})?",
                "buy [0-9] get 1.{0,20}",
            ],
            fp in prop::option::of(-50.0f64..500.0),
        ) {
            let out = resolve(price, &mech, "", fp);
            prop_assert!(out.final_price > 0.0);
            prop_assert!(!out.discount_label.is_empty());
            prop_assert_eq!(out.discount_label.clone(), out.discount_label.to_uppercase());
        }
    }
}
