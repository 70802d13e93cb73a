// src/services/extractor.rs

//! Listing extractor.
//!
//! Parses a fetched listing document into a [`Snapshot`] (or the fuller
//! [`ListingDetails`]) using configured CSS selectors. Extraction is a pure
//! function of the document: no network and no storage access happen here.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;
use crate::models::{ExtractorSelectors, ListingDetails, Snapshot};
use crate::utils::listing_id_from_url;

/// Marker text of a depleted listing.
const OUT_OF_STOCK: &str = "Out of Stock";

/// Prefix of capped quantity texts such as "More than 10 available".
const MORE_THAN: &str = "More than";

/// Unit suffix appended to per-item prices.
const UNIT_SUFFIX: &str = "/ea";

/// Size markers in gallery image URLs: thumbnail and full size.
const THUMBNAIL_SIZE: &str = "l140";
const FULL_SIZE: &str = "l1600";

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*").expect("integer pattern is valid"));

/// A fetched listing document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Canonical URL (after redirects)
    pub url: String,
    pub body: String,
}

impl Document {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
        }
    }
}

/// Price parsed from the primary price text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub amount: f64,
    pub currency: Option<String>,
}

/// Extracts listing snapshots from documents.
#[derive(Debug, Clone)]
pub struct ListingExtractor {
    title: Selector,
    price: Selector,
    availability: Selector,
    availability_items: Selector,
    quantity: Selector,
    feature_row: Selector,
    feature_label: Selector,
    feature_value: Selector,
    seller: Selector,
    image: Selector,
}

impl ListingExtractor {
    /// Create an extractor, compiling every selector up front.
    pub fn new(selectors: &ExtractorSelectors) -> Result<Self, ParseError> {
        Ok(Self {
            title: Self::parse_selector(&selectors.title)?,
            price: Self::parse_selector(&selectors.price)?,
            availability: Self::parse_selector(&selectors.availability)?,
            availability_items: Self::parse_selector(&selectors.availability_items)?,
            quantity: Self::parse_selector(&selectors.quantity)?,
            feature_row: Self::parse_selector(&selectors.feature_row)?,
            feature_label: Self::parse_selector(&selectors.feature_label)?,
            feature_value: Self::parse_selector(&selectors.feature_value)?,
            seller: Self::parse_selector(&selectors.seller)?,
            image: Self::parse_selector(&selectors.image)?,
        })
    }

    /// Parse one document into a snapshot.
    pub fn extract(&self, document: &Document) -> Result<Snapshot, ParseError> {
        let id = listing_id_from_url(&document.url)?;
        let html = Html::parse_document(&document.body);

        let title = html
            .select(&self.title)
            .next()
            .map(|el| element_text(el).trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ParseError::MissingTitle)?;

        let price = html
            .select(&self.price)
            .next()
            .and_then(|el| parse_price_text(&element_text(el)));

        Ok(Snapshot {
            id,
            title,
            url: document.url.clone(),
            stock: self.extract_stock(&html),
            price: price.as_ref().map(|p| p.amount),
            currency: price.and_then(|p| p.currency),
        })
    }

    /// Parse one document into its snapshot plus item specifics, seller link
    /// and (when `with_images`) full-size gallery image URLs.
    pub fn extract_details(
        &self,
        document: &Document,
        with_images: bool,
        scraped_at: DateTime<Utc>,
    ) -> Result<ListingDetails, ParseError> {
        let snapshot = self.extract(document)?;
        let html = Html::parse_document(&document.body);

        let mut features = BTreeMap::new();
        for row in html.select(&self.feature_row) {
            let label = row.select(&self.feature_label).next().map(element_text);
            let value = row.select(&self.feature_value).next().map(element_text);
            if let (Some(label), Some(value)) = (label, value) {
                let label = label.trim();
                if !label.is_empty() {
                    features.insert(label.to_string(), value.trim().to_string());
                }
            }
        }

        let seller_url = html
            .select(&self.seller)
            .next()
            .and_then(|link| link.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty())
            .map(str::to_string);

        let images = if with_images {
            html.select(&self.image)
                .filter_map(|img| img.value().attr("src"))
                .map(|src| src.replace(THUMBNAIL_SIZE, FULL_SIZE))
                .collect()
        } else {
            Vec::new()
        };

        Ok(ListingDetails {
            snapshot,
            features,
            seller_url,
            images,
            scraped_at,
        })
    }

    /// Stock count from the availability block; zero when undeterminable.
    fn extract_stock(&self, html: &Html) -> u32 {
        let Some(block) = html.select(&self.availability).next() else {
            return 0;
        };

        let depleted = block.text().any(|t| t.trim() == OUT_OF_STOCK)
            || block
                .select(&self.availability_items)
                .any(|item| element_text(item).trim() == OUT_OF_STOCK);
        if depleted {
            return 0;
        }

        block
            .select(&self.quantity)
            .next()
            .map(|el| parse_quantity(&element_text(el)))
            .unwrap_or(0)
    }

    fn parse_selector(s: &str) -> Result<Selector, ParseError> {
        Selector::parse(s).map_err(|e| ParseError::Selector {
            selector: s.to_string(),
            message: format!("{e:?}"),
        })
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Parse a price text such as `US $12,345.67/ea`.
///
/// The first token is the currency code, the last token the amount. A single
/// token yields an amount without currency.
pub fn parse_price_text(text: &str) -> Option<ParsedPrice> {
    let cleaned = text.replace(UNIT_SUFFIX, " ");
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();
    let (first, last) = (tokens.first()?, tokens.last()?);

    let amount = normalize_amount(last)?;
    let currency = (tokens.len() > 1).then(|| first.to_string());
    Some(ParsedPrice { amount, currency })
}

/// Normalize an amount token to a number.
///
/// Currency symbols are dropped. The last `,` or `.` is the decimal point when
/// at most two digits follow it; every other separator groups thousands.
pub fn normalize_amount(token: &str) -> Option<f64> {
    let kept: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let (whole, fraction) = match kept.rfind([',', '.']) {
        Some(pos) => {
            let tail = &kept[pos + 1..];
            if (1..=2).contains(&tail.len()) && tail.chars().all(|c| c.is_ascii_digit()) {
                (&kept[..pos], tail)
            } else {
                (kept.as_str(), "")
            }
        }
        None => (kept.as_str(), ""),
    };

    let digits: String = whole.chars().filter(char::is_ascii_digit).collect();
    let number = if fraction.is_empty() {
        digits
    } else {
        format!("{}.{fraction}", if digits.is_empty() { "0" } else { digits.as_str() })
    };
    number.parse().ok()
}

/// Parse the secondary quantity text into a stock count.
///
/// Counts beyond `u32::MAX` saturate.
pub fn parse_quantity(text: &str) -> u32 {
    let text = text.trim();
    let candidate = match text.strip_prefix(MORE_THAN) {
        Some(rest) => rest.split_whitespace().next(),
        None => INTEGER.find(text).map(|m| m.as_str()),
    };

    let Some(digits) = candidate.map(|token| token.replace(',', "")) else {
        return 0;
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    digits
        .parse::<u64>()
        .map_or(u32::MAX, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.ebay.com/itm/256123456789";

    fn extractor() -> ListingExtractor {
        ListingExtractor::new(&ExtractorSelectors::default()).unwrap()
    }

    fn page(price: Option<&str>, availability: &str) -> Document {
        let price_html = price
            .map(|p| {
                format!(
                    r#"<div class="x-bin-price__content"><div class="x-price-primary"><span class="ux-textspans">{p}</span></div></div>"#
                )
            })
            .unwrap_or_default();
        Document::new(
            URL,
            format!(
                r#"<html><body>
                <h1 class="x-item-title__mainTitle"><span>  Vintage   Camera Lens </span></h1>
                {price_html}
                <div class="x-quantity__availability">{availability}</div>
                </body></html>"#
            ),
        )
    }

    fn secondary(text: &str) -> String {
        format!(r#"<span class="ux-textspans ux-textspans--SECONDARY">{text}</span>"#)
    }

    #[test]
    fn test_extract_full_listing() {
        let doc = page(Some("US $12,345.67/ea"), &secondary("3 available"));
        let snapshot = extractor().extract(&doc).unwrap();

        assert_eq!(snapshot.id, "256123456789");
        assert_eq!(snapshot.title, "Vintage   Camera Lens");
        assert_eq!(snapshot.url, URL);
        assert_eq!(snapshot.stock, 3);
        assert_eq!(snapshot.price, Some(12345.67));
        assert_eq!(snapshot.currency.as_deref(), Some("US"));
    }

    #[test]
    fn test_extract_is_idempotent() {
        let extractor = self::extractor();
        let doc = page(Some("EUR 19,99"), &secondary("More than 10 available"));
        assert_eq!(
            extractor.extract(&doc).unwrap(),
            extractor.extract(&doc).unwrap()
        );
    }

    #[test]
    fn test_more_than_quantity() {
        let doc = page(None, &secondary("More than 10 available"));
        let snapshot = extractor().extract(&doc).unwrap();
        assert_eq!(snapshot.stock, 10);
    }

    #[test]
    fn test_out_of_stock_wins_over_quantity() {
        let availability = format!("<span>Out of Stock</span>{}", secondary("5 available"));
        let doc = page(Some("US $5.00"), &availability);
        let snapshot = extractor().extract(&doc).unwrap();
        assert_eq!(snapshot.stock, 0);
    }

    #[test]
    fn test_missing_price_leaves_both_empty() {
        let doc = page(None, &secondary("2 available"));
        let snapshot = extractor().extract(&doc).unwrap();
        assert_eq!(snapshot.price, None);
        assert_eq!(snapshot.currency, None);
    }

    #[test]
    fn test_unreadable_quantity_degrades_to_zero() {
        let doc = page(None, &secondary("Last one"));
        assert_eq!(extractor().extract(&doc).unwrap().stock, 0);

        let doc = page(None, "");
        assert_eq!(extractor().extract(&doc).unwrap().stock, 0);
    }

    #[test]
    fn test_missing_title() {
        let doc = Document::new(URL, "<html><body><p>nothing</p></body></html>");
        assert_eq!(
            extractor().extract(&doc),
            Err(ParseError::MissingTitle)
        );
    }

    #[test]
    fn test_invalid_url() {
        let mut doc = page(None, "");
        doc.url = "https://www.ebay.com".to_string();
        assert!(matches!(
            extractor().extract(&doc),
            Err(ParseError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_invalid_selector() {
        let selectors = ExtractorSelectors {
            title: "[[invalid".to_string(),
            ..ExtractorSelectors::default()
        };
        assert!(matches!(
            ListingExtractor::new(&selectors),
            Err(ParseError::Selector { .. })
        ));
    }

    #[test]
    fn test_parse_price_text() {
        assert_eq!(
            parse_price_text("US $12,345.67 /ea"),
            Some(ParsedPrice {
                amount: 12345.67,
                currency: Some("US".to_string())
            })
        );
        assert_eq!(
            parse_price_text("$8.50"),
            Some(ParsedPrice {
                amount: 8.5,
                currency: None
            })
        );
        assert_eq!(parse_price_text("   "), None);
        assert_eq!(parse_price_text("GBP free"), None);
    }

    #[test]
    fn test_normalize_amount_separators() {
        assert_eq!(normalize_amount("12.345,67"), Some(12345.67));
        assert_eq!(normalize_amount("1,234"), Some(1234.0));
        assert_eq!(normalize_amount("19,9"), Some(19.9));
        assert_eq!(normalize_amount("£1,000,000.00"), Some(1_000_000.0));
        assert_eq!(normalize_amount("$"), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("3 available"), 3);
        assert_eq!(parse_quantity("More than 10 available"), 10);
        assert_eq!(parse_quantity("1,250 available"), 1250);
        assert_eq!(parse_quantity("More than many"), 0);
        assert_eq!(parse_quantity(""), 0);
    }

    #[test]
    fn test_parse_quantity_saturates() {
        assert_eq!(parse_quantity("4294967295 available"), u32::MAX);
        assert_eq!(parse_quantity("5,000,000,000 available"), u32::MAX);
        assert_eq!(parse_quantity("More than 99999999999999999999999 available"), u32::MAX);
        assert_eq!(parse_quantity("More than 4,294,967,296"), u32::MAX);
    }

    fn details_page(gallery: &str) -> Document {
        Document::new(
            URL,
            format!(
                r#"<html><body>
                <h1 class="x-item-title__mainTitle"><span>Vintage Camera Lens</span></h1>
                <div class="x-bin-price__content"><div class="x-price-primary"><span class="ux-textspans">US $40.00</span></div></div>
                <div class="x-quantity__availability"><span class="ux-textspans ux-textspans--SECONDARY">2 available</span></div>
                <div class="x-sellercard-atf__info__about-seller"><a href="https://www.ebay.com/str/lensshop"><span>lensshop</span></a></div>
                <dl class="ux-labels-values"><dt class="ux-labels-values__labels"><span>Brand</span></dt><dd class="ux-labels-values__values"><span> Canon </span></dd></dl>
                <dl class="ux-labels-values"><dt class="ux-labels-values__labels">Mount</dt><dd class="ux-labels-values__values">EF</dd></dl>
                <dl class="ux-labels-values"><dt class="ux-labels-values__labels">Orphan label</dt></dl>
                {gallery}
                </body></html>"#
            ),
        )
    }

    #[test]
    fn test_extract_details() {
        let gallery = r#"<div class="ux-image-grid no-scrollbar">
            <img src="https://i.ebayimg.com/images/g/abc/s-l140.jpg">
            <img alt="no source">
            <img src="https://i.ebayimg.com/images/g/def/s-l140.webp">
            </div>"#;
        let now = Utc::now();
        let details = extractor()
            .extract_details(&details_page(gallery), true, now)
            .unwrap();

        assert_eq!(details.snapshot.id, "256123456789");
        assert_eq!(details.snapshot.stock, 2);
        assert_eq!(details.snapshot.price, Some(40.0));
        assert_eq!(details.features.len(), 2);
        assert_eq!(details.features["Brand"], "Canon");
        assert_eq!(details.features["Mount"], "EF");
        assert_eq!(
            details.seller_url.as_deref(),
            Some("https://www.ebay.com/str/lensshop")
        );
        assert_eq!(
            details.images,
            vec![
                "https://i.ebayimg.com/images/g/abc/s-l1600.jpg",
                "https://i.ebayimg.com/images/g/def/s-l1600.webp",
            ]
        );
        assert_eq!(details.scraped_at, now);
    }

    #[test]
    fn test_extract_details_without_images_or_seller() {
        let gallery = r#"<div class="ux-image-grid"><img src="https://i.ebayimg.com/images/g/abc/s-l140.jpg"></div>"#;
        let details = extractor()
            .extract_details(&details_page(gallery), false, Utc::now())
            .unwrap();
        assert!(details.images.is_empty());

        let bare = page(Some("US $5.00"), "");
        let details = extractor().extract_details(&bare, true, Utc::now()).unwrap();
        assert!(details.features.is_empty());
        assert_eq!(details.seller_url, None);
        assert!(details.images.is_empty());
    }
}
