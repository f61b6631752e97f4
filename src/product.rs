//! Product record type, schema-alias resolution, and searchable-text synthesis.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered alias tables for the logical product fields.
///
/// Historical exports of the catalog used several key spellings per field;
/// resolution walks each table left to right and takes the first present,
/// non-empty value. Precedence order is load-bearing and must not change.
const ID_ALIASES: &[&str] = &["product_id", "asin", "id"];
const TITLE_ALIASES: &[&str] = &["title", "product_name"];
const DESCRIPTION_ALIASES: &[&str] = &["description", "product_description"];
const CATEGORY_ALIASES: &[&str] = &["category", "main_cat"];
const BRAND_ALIASES: &[&str] = &["brand"];
const PRICE_ALIASES: &[&str] = &["price"];
const UNIT_PRICE_ALIASES: &[&str] = &["unit_price", "price"];
const RATING_ALIASES: &[&str] = &["rating", "average_rating"];
const REVIEW_COUNT_ALIASES: &[&str] = &["review_count", "num_reviews"];
const RANKING_ALIASES: &[&str] = &["ranking", "rank"];
const VOTES_ALIASES: &[&str] = &["votes", "vote_count", "review_count", "num_reviews"];
const IMAGE_URL_ALIASES: &[&str] = &["image_url", "image"];
const SOURCE_URL_ALIASES: &[&str] = &["amazon_url", "url", "product_url"];

/// One catalog product, resolved from a raw export row.
///
/// `id` is the natural key; re-ingesting the same id replaces prior data.
/// Missing numeric fields stay absent rather than being coerced to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Stable natural key (ASIN-style identifier).
    pub id: String,
    /// Product title.
    pub title: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Top-level category label.
    pub category: Option<String>,
    /// Brand name.
    pub brand: Option<String>,
    /// Listed price.
    pub price: Option<f64>,
    /// Per-unit price; falls back to the listed price in old exports.
    pub unit_price: Option<f64>,
    /// Average star rating, 0.0 through 5.0.
    pub rating: Option<f64>,
    /// Number of reviews.
    pub review_count: Option<i64>,
    /// Sales-rank position.
    pub ranking: Option<i64>,
    /// Helpfulness vote count.
    pub votes: Option<i64>,
    /// Primary image URL.
    pub image_url: Option<String>,
    /// Product page URL; synthesized from the id when the export lacks one.
    pub source_url: Option<String>,
}

impl ProductRecord {
    /// Resolves a raw export row into a record using the alias tables.
    ///
    /// Returns `None` when no id alias resolves; such rows cannot be
    /// upserted and are dropped (with a log line) at the loading boundary.
    pub fn from_raw(raw: &Map<String, Value>) -> Option<Self> {
        let id = first_string(raw, ID_ALIASES)?;
        let source_url = first_string(raw, SOURCE_URL_ALIASES)
            .or_else(|| Some(format!("https://www.amazon.com/dp/{id}")));
        Some(Self {
            id,
            title: first_string(raw, TITLE_ALIASES),
            description: first_string(raw, DESCRIPTION_ALIASES),
            category: first_string(raw, CATEGORY_ALIASES),
            brand: first_string(raw, BRAND_ALIASES),
            price: first_f64(raw, PRICE_ALIASES),
            unit_price: first_f64(raw, UNIT_PRICE_ALIASES),
            rating: first_f64(raw, RATING_ALIASES),
            review_count: first_i64(raw, REVIEW_COUNT_ALIASES),
            ranking: first_i64(raw, RANKING_ALIASES),
            votes: first_i64(raw, VOTES_ALIASES),
            image_url: first_string(raw, IMAGE_URL_ALIASES),
            source_url,
        })
    }

    /// Builds the searchable text blob submitted to the embedding model.
    ///
    /// Concatenates title, description, `Brand: <brand>` and
    /// `Category: <category>` in that order, joined by single spaces,
    /// skipping absent or empty fields. An empty result means the record
    /// carries no indexable text and should be skipped, not treated as an
    /// error.
    pub fn searchable_text(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(4);
        if let Some(title) = non_empty(&self.title) {
            parts.push(title.to_string());
        }
        if let Some(description) = non_empty(&self.description) {
            parts.push(description.to_string());
        }
        if let Some(brand) = non_empty(&self.brand) {
            parts.push(format!("Brand: {brand}"));
        }
        if let Some(category) = non_empty(&self.category) {
            parts.push(format!("Category: {category}"));
        }
        parts.join(" ")
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn first_string(raw: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|key| match raw.get(*key) {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        // Some exports carry numeric ids.
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn first_f64(raw: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    aliases
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_f64))
}

fn first_i64(raw: &Map<String, Value>, aliases: &[&str]) -> Option<i64> {
    aliases
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_i64))
}
