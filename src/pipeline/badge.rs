//! Product card view model: what the renderer shows for one product.

use crate::output::ProcessedProduct;
use serde::{Deserialize, Serialize};

/// Savings below this are not worth a sticker.
const MIN_SAVINGS: f64 = 0.5;

/// Final price above which an unlabelled offer counts as premium.
const PREMIUM_PRICE: f64 = 150.0;

const BUNDLE_MARKERS: [&str; 8] = ["2+1", "3+1", "buy 2", "buy 3", "bundle", "set", "pack", "pcs"];
const BOGO_MARKERS: [&str; 2] = ["1+1", "buy 1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeIcon {
    Gift,
    Cart,
    Star,
    Flame,
}

/// Banner shown across the top of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PromoBadge {
    BundleOffer,
    BuyOneGetOne,
    PremiumPick,
    HotOffer,
}

impl PromoBadge {
    /// Classify a product by its label, first match wins.
    pub fn classify(discount_label: &str, final_price: f64) -> Self {
        let l = discount_label.to_lowercase();
        if BUNDLE_MARKERS.iter().any(|m| l.contains(m)) {
            PromoBadge::BundleOffer
        } else if BOGO_MARKERS.iter().any(|m| l.contains(m)) {
            PromoBadge::BuyOneGetOne
        } else if final_price > PREMIUM_PRICE || l.contains("premium") {
            PromoBadge::PremiumPick
        } else {
            PromoBadge::HotOffer
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            PromoBadge::BundleOffer => "BUNDLE OFFER",
            PromoBadge::BuyOneGetOne => "BUY 1 GET 1 FREE",
            PromoBadge::PremiumPick => "PREMIUM PICK",
            PromoBadge::HotOffer => "HOT OFFER",
        }
    }

    pub fn icon(self) -> BadgeIcon {
        match self {
            PromoBadge::BundleOffer => BadgeIcon::Gift,
            PromoBadge::BuyOneGetOne => BadgeIcon::Cart,
            PromoBadge::PremiumPick => BadgeIcon::Star,
            PromoBadge::HotOffer => BadgeIcon::Flame,
        }
    }
}

/// Price split for large whole-number display with small cents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceParts {
    pub whole: String,
    /// Always two digits.
    pub fraction: String,
}

impl PriceParts {
    pub fn new(price: f64) -> Self {
        let cents = (price.max(0.0) * 100.0).round() as u64;
        Self {
            whole: (cents / 100).to_string(),
            fraction: format!("{:02}", cents % 100),
        }
    }
}

/// Savings sticker contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Savings {
    pub amount: u64,
    pub percent: u64,
    /// Struck-through original price, two decimals.
    pub was: String,
}

/// Everything a card displays, derived from a product.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductCard {
    pub badge: PromoBadge,
    pub badge_text: &'static str,
    pub icon: BadgeIcon,
    /// English label; hidden when the badge already says it.
    pub label: Option<String>,
    pub label_ar: Option<String>,
    pub name: String,
    pub name_ar: Option<String>,
    pub sku_line: String,
    pub savings: Option<Savings>,
    pub price: PriceParts,
    pub image_url: String,
    pub logo_url: Option<String>,
    pub product_page_url: Option<String>,
}

impl From<&ProcessedProduct> for ProductCard {
    fn from(p: &ProcessedProduct) -> Self {
        let badge = PromoBadge::classify(&p.discount_label, p.final_price);
        let saved = p.original_price - p.final_price;
        let savings = (saved > MIN_SAVINGS).then(|| Savings {
            amount: saved.round() as u64,
            percent: if p.original_price > 0.0 {
                (saved / p.original_price * 100.0).round() as u64
            } else {
                0
            },
            was: format!("{:.2}", p.original_price),
        });

        Self {
            badge,
            badge_text: badge.text(),
            icon: badge.icon(),
            label: (badge != PromoBadge::BuyOneGetOne).then(|| p.discount_label.clone()),
            label_ar: p.discount_label_ar.clone(),
            name: p.name.clone(),
            name_ar: p.name_ar.clone(),
            sku_line: format!("SKU: {}", p.sku),
            savings,
            price: PriceParts::new(p.final_price),
            image_url: p.image_url.clone(),
            logo_url: p.logo_url.clone(),
            product_page_url: p.product_page_url.clone(),
        }
    }
}
