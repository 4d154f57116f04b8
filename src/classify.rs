// src/classify.rs

//! Stock-state classification.
//!
//! Applies an ordered chain of heuristics to a parsed product page. The
//! heuristics are OR'd: any positive match anywhere in the chain forces
//! [`Verdict::OutOfStock`], and there is no negative override. A page that
//! matches nothing classifies [`Verdict::InStock`].
//!
//! The chain is biased toward out-of-stock on ambiguity. A missed restock is
//! simply noticed on the next sweep; a false in-stock verdict sends a
//! spurious notification.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::error::{AppError, Result};
use crate::models::{ClassifierConfig, HeuristicRule, Verdict};

/// A heuristic rule compiled into matchable form.
enum CompiledRule {
    ButtonText {
        selector: Selector,
        phrases: Vec<Regex>,
    },
    MarkerPresent {
        selector: Selector,
    },
    PageText {
        phrases: Vec<Regex>,
    },
}

impl CompiledRule {
    fn compile(rule: &HeuristicRule) -> Result<Self> {
        rule.validate()?;
        match rule {
            HeuristicRule::ButtonText { selector, phrases } => Ok(CompiledRule::ButtonText {
                selector: parse_selector(selector)?,
                phrases: compile_phrases(phrases)?,
            }),
            HeuristicRule::MarkerPresent { selector } => Ok(CompiledRule::MarkerPresent {
                selector: parse_selector(selector)?,
            }),
            HeuristicRule::PageText { phrases } => Ok(CompiledRule::PageText {
                phrases: compile_phrases(phrases)?,
            }),
        }
    }

    /// Whether this rule flags the document as out of stock.
    fn matches(&self, document: &Html) -> bool {
        match self {
            CompiledRule::ButtonText { selector, phrases } => document
                .select(selector)
                .any(|element| contains_any(&element_text(element), phrases)),
            CompiledRule::MarkerPresent { selector } => document.select(selector).next().is_some(),
            CompiledRule::PageText { phrases } => contains_any(&document_text(document), phrases),
        }
    }

    /// Short description for debug logging.
    fn describe(&self) -> String {
        match self {
            CompiledRule::ButtonText { phrases, .. } => {
                format!("button text ({} phrases)", phrases.len())
            }
            CompiledRule::MarkerPresent { selector } => format!("marker {:?}", selector),
            CompiledRule::PageText { phrases } => format!("page text ({} phrases)", phrases.len()),
        }
    }
}

/// Ordered chain of sold-out heuristics.
pub struct StockClassifier {
    rules: Vec<CompiledRule>,
}

impl StockClassifier {
    /// Compile the configured rule chain.
    ///
    /// Selector or phrase problems surface here, at startup, never during a
    /// sweep.
    pub fn from_config(config: &ClassifierConfig) -> Result<Self> {
        if config.rules.is_empty() {
            return Err(AppError::validation("classifier has no rules"));
        }
        let rules = config
            .rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Classify a parsed product page.
    ///
    /// Never fails for malformed-but-parseable markup; scraper builds a
    /// best-effort tree and unmatched selectors simply do not match.
    pub fn classify(&self, document: &Html) -> Verdict {
        for rule in &self.rules {
            if rule.matches(document) {
                log::debug!("Sold-out heuristic matched: {}", rule.describe());
                return Verdict::OutOfStock;
            }
        }
        Verdict::InStock
    }
}

/// Collect an element's visible text, whitespace-normalized.
fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collect the whole document's text, whitespace-normalized.
fn document_text(document: &Html) -> String {
    document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn contains_any(text: &str, phrases: &[Regex]) -> bool {
    phrases.iter().any(|phrase| phrase.is_match(text))
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

/// Compile a phrase into a case-insensitive matcher tolerant of arbitrary
/// whitespace between words (storefront markup breaks lines freely).
fn compile_phrase(phrase: &str) -> Result<Regex> {
    let words: Vec<String> = phrase.split_whitespace().map(regex::escape).collect();
    if words.is_empty() {
        return Err(AppError::validation("empty phrase in classifier rule"));
    }
    let pattern = format!("(?i){}", words.join(r"\s+"));
    Regex::new(&pattern)
        .map_err(|e| AppError::validation(format!("bad phrase '{phrase}': {e}")))
}

fn compile_phrases(phrases: &[String]) -> Result<Vec<Regex>> {
    phrases.iter().map(|p| compile_phrase(p)).collect()
}
