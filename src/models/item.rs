//! Tracked item and sweep event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binary stock verdict for one product page at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    InStock,
    OutOfStock,
}

impl Verdict {
    /// Build a verdict from the persisted boolean form.
    pub fn from_bool(in_stock: bool) -> Self {
        if in_stock {
            Verdict::InStock
        } else {
            Verdict::OutOfStock
        }
    }

    pub fn is_in_stock(self) -> bool {
        matches!(self, Verdict::InStock)
    }

    /// Human-readable label for log output.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::InStock => "IN STOCK",
            Verdict::OutOfStock => "OUT OF STOCK",
        }
    }
}

/// A monitored product.
///
/// Items are never deleted, only deactivated; `last_known_in_stock` is
/// mutated exclusively by the engine after a sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackedItem {
    /// Unique human-readable key within the store
    pub id: String,

    /// Path appended to the configured base URL to form the fetch target
    pub url_fragment: String,

    /// Inactive items are skipped by sweeps and never notify
    pub active: bool,

    /// Last verdict persisted for this item
    #[serde(default)]
    pub last_known_in_stock: bool,
}

impl TrackedItem {
    /// Create a freshly tracked item: active, not yet seen in stock.
    pub fn new(id: impl Into<String>, url_fragment: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url_fragment: url_fragment.into(),
            active: true,
            last_known_in_stock: false,
        }
    }

    /// Full product URL for this item against the given base URL.
    pub fn product_url(&self, base_url: &str) -> String {
        crate::utils::resolve(base_url, &self.url_fragment).unwrap_or_else(|| {
            format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                self.url_fragment.trim_start_matches('/')
            )
        })
    }
}

/// Result of checking a single item. Ephemeral; folded into the tracked
/// item's state by the engine.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub id: String,
    pub verdict: Verdict,
    pub fetched_at: DateTime<Utc>,
}

/// Emitted when an active item's verdict differs from the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateChangeEvent {
    pub id: String,
    pub url_fragment: String,
    pub previous: Verdict,
    pub current: Verdict,
    pub detected_at: DateTime<Utc>,
}

impl StateChangeEvent {
    /// Whether this transition is out-of-stock to in-stock.
    pub fn is_restock(&self) -> bool {
        self.current.is_in_stock()
    }

    /// Format the event for display using a template.
    ///
    /// Supported placeholders:
    /// - `{id}`, `{url_fragment}`, `{previous}`, `{current}`
    pub fn format(&self, template: &str) -> String {
        template
            .replace("{id}", &self.id)
            .replace("{url_fragment}", &self.url_fragment)
            .replace("{previous}", self.previous.label())
            .replace("{current}", self.current.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> StateChangeEvent {
        StateChangeEvent {
            id: "sayaka".to_string(),
            url_fragment: "/products/sayaka-no-mukashi".to_string(),
            previous: Verdict::OutOfStock,
            current: Verdict::InStock,
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn test_verdict_from_bool() {
        assert_eq!(Verdict::from_bool(true), Verdict::InStock);
        assert_eq!(Verdict::from_bool(false), Verdict::OutOfStock);
        assert!(Verdict::from_bool(true).is_in_stock());
    }

    #[test]
    fn test_product_url() {
        let item = TrackedItem::new("sayaka", "/products/sayaka-no-mukashi");
        assert_eq!(
            item.product_url("https://ippodotea.com"),
            "https://ippodotea.com/products/sayaka-no-mukashi"
        );
    }

    #[test]
    fn test_new_item_defaults() {
        let item = TrackedItem::new("x", "/products/x");
        assert!(item.active);
        assert!(!item.last_known_in_stock);
    }

    #[test]
    fn test_event_format() {
        let event = sample_event();
        let result = event.format("{id}: {previous} -> {current}");
        assert_eq!(result, "sayaka: OUT OF STOCK -> IN STOCK");
        assert!(event.is_restock());
    }
}
