//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and sweep behavior settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Stock classification heuristics
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Products seeded into the item store on first run
    #[serde(default = "defaults::default_catalog")]
    pub catalog: Vec<CatalogItem>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.watcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("watcher.user_agent is empty"));
        }
        if self.watcher.timeout_secs == 0 {
            return Err(AppError::validation("watcher.timeout_secs must be > 0"));
        }
        if self.watcher.sweep_interval_secs == 0 {
            return Err(AppError::validation(
                "watcher.sweep_interval_secs must be > 0",
            ));
        }
        if url::Url::parse(&self.watcher.base_url).is_err() {
            return Err(AppError::validation(format!(
                "watcher.base_url is not a valid URL: {}",
                self.watcher.base_url
            )));
        }
        if self.catalog.is_empty() {
            return Err(AppError::validation("No catalog items defined"));
        }
        let mut seen = std::collections::HashSet::new();
        for item in &self.catalog {
            if item.id.trim().is_empty() {
                return Err(AppError::validation("catalog item with empty id"));
            }
            if item.url_fragment.trim().is_empty() {
                return Err(AppError::validation(format!(
                    "catalog item '{}' has an empty url_fragment",
                    item.id
                )));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(AppError::validation(format!(
                    "duplicate catalog item id '{}'",
                    item.id
                )));
            }
        }
        if self.classifier.rules.is_empty() {
            return Err(AppError::validation("No classifier rules defined"));
        }
        for rule in &self.classifier.rules {
            rule.validate()?;
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watcher: WatcherConfig::default(),
            classifier: ClassifierConfig::default(),
            catalog: defaults::default_catalog(),
        }
    }
}

/// HTTP client and sweep behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Base URL that item url_fragments are resolved against
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Delay between item checks within a sweep, in seconds
    #[serde(default = "defaults::item_delay")]
    pub item_delay_secs: u64,

    /// Cadence of timer-triggered sweeps, in seconds
    #[serde(default = "defaults::sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            item_delay_secs: defaults::item_delay(),
            sweep_interval_secs: defaults::sweep_interval(),
        }
    }
}

/// Stock classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Ordered heuristic chain; any match classifies out-of-stock
    #[serde(default = "defaults::default_rules")]
    pub rules: Vec<HeuristicRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            rules: defaults::default_rules(),
        }
    }
}

/// One rule in the classifier's heuristic chain.
///
/// Rules are data so the strictness level can be tuned per deployment
/// without touching code: a selector-only chain for stable storefront
/// templates, or the full chain including the whole-page phrase scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HeuristicRule {
    /// Any element matched by `selector` whose visible text contains one of
    /// `phrases` marks the page out of stock
    ButtonText {
        selector: String,
        phrases: Vec<String>,
    },

    /// The mere presence of an element matched by `selector` marks the page
    /// out of stock
    MarkerPresent { selector: String },

    /// The whole document text containing one of `phrases` marks the page
    /// out of stock
    PageText { phrases: Vec<String> },
}

impl HeuristicRule {
    /// Validate rule fields at the data level. Selector syntax is checked
    /// when the rule is compiled.
    pub fn validate(&self) -> Result<()> {
        match self {
            HeuristicRule::ButtonText { selector, phrases } => {
                if selector.trim().is_empty() {
                    return Err(AppError::validation("button_text rule with empty selector"));
                }
                Self::validate_phrases(phrases)
            }
            HeuristicRule::MarkerPresent { selector } => {
                if selector.trim().is_empty() {
                    return Err(AppError::validation(
                        "marker_present rule with empty selector",
                    ));
                }
                Ok(())
            }
            HeuristicRule::PageText { phrases } => Self::validate_phrases(phrases),
        }
    }

    fn validate_phrases(phrases: &[String]) -> Result<()> {
        if phrases.is_empty() {
            return Err(AppError::validation("rule with empty phrase list"));
        }
        if phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(AppError::validation("rule with blank phrase"));
        }
        Ok(())
    }
}

/// A product in the default catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Unique item identifier
    pub id: String,

    /// Path appended to the base URL
    pub url_fragment: String,
}

mod defaults {
    use super::{CatalogItem, HeuristicRule};

    // Watcher defaults
    pub fn base_url() -> String {
        "https://ippodotea.com".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn item_delay() -> u64 {
        30
    }
    pub fn sweep_interval() -> u64 {
        300
    }

    // Catalog defaults
    pub fn default_catalog() -> Vec<CatalogItem> {
        vec![
            CatalogItem {
                id: "sayaka".to_string(),
                url_fragment: "/products/sayaka-no-mukashi".to_string(),
            },
            CatalogItem {
                id: "ummon".to_string(),
                url_fragment: "/products/ummon-no-mukashi".to_string(),
            },
            CatalogItem {
                id: "ikuyo".to_string(),
                url_fragment: "/products/ikuyo-no-mukashi".to_string(),
            },
        ]
    }

    // Classifier rule defaults, strictest first
    pub fn default_rules() -> Vec<HeuristicRule> {
        vec![
            HeuristicRule::ButtonText {
                selector: "button[type=\"submit\"]".to_string(),
                phrases: vec![
                    "sold out".to_string(),
                    "out of stock".to_string(),
                    "unavailable".to_string(),
                ],
            },
            HeuristicRule::ButtonText {
                selector: "button, .btn".to_string(),
                phrases: vec!["sold out".to_string(), "out of stock".to_string()],
            },
            HeuristicRule::MarkerPresent {
                selector: ".sold-out".to_string(),
            },
            HeuristicRule::MarkerPresent {
                selector: ".out-of-stock".to_string(),
            },
            HeuristicRule::MarkerPresent {
                selector: ".product-form__cart-submit[disabled]".to_string(),
            },
            HeuristicRule::MarkerPresent {
                selector: "button[type=\"submit\"][disabled]".to_string(),
            },
            HeuristicRule::PageText {
                phrases: vec![
                    "enter your email address below to be notified".to_string(),
                    "you will receive an email as soon as".to_string(),
                    "back in stock".to_string(),
                    "sold out".to_string(),
                ],
            },
        ]
    }
}
