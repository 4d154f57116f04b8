// src/engine/mod.rs

//! Change-detection engine.
//!
//! For each active item the engine fetches the product page, classifies it,
//! compares the verdict to the stored one, persists on change, and emits a
//! [`StateChangeEvent`]. Sweeps are strictly serialized: one sweep runs to
//! completion before another may start. The trigger channel in [`trigger`]
//! gives that ordering structurally; the internal sweep lock additionally
//! guards hosts that call [`SweepEngine::run_sweep`] from parallel tasks.

pub mod trigger;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use scraper::Html;
use tokio::sync::Mutex;

use crate::classify::StockClassifier;
use crate::error::Result;
use crate::fetch::{FetchError, PageSource};
use crate::models::{CheckResult, StateChangeEvent, TrackedItem, Verdict, WatcherConfig};
use crate::notify::EventSink;
use crate::storage::ItemStore;

pub use trigger::{SweepTrigger, run_trigger_loop, spawn_timer};

/// Per-item status for ad-hoc queries.
#[derive(Debug, Clone)]
pub struct ItemStatus {
    pub id: String,
    pub active: bool,
    pub in_stock: bool,
}

/// Snapshot answering a status query.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// When the last sweep in this process finished, if any
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub items: Vec<ItemStatus>,
}

/// Orchestrates sweeps over the tracked catalog.
pub struct SweepEngine {
    config: WatcherConfig,
    source: Arc<dyn PageSource>,
    classifier: StockClassifier,
    store: Arc<dyn ItemStore>,
    sink: Arc<dyn EventSink>,
    /// Held for the whole of a sweep or tracking update; later callers
    /// queue behind the holder instead of interleaving store writes.
    sweep_lock: Mutex<()>,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl SweepEngine {
    pub fn new(
        config: WatcherConfig,
        source: Arc<dyn PageSource>,
        classifier: StockClassifier,
        store: Arc<dyn ItemStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            config,
            source,
            classifier,
            store,
            sink,
            sweep_lock: Mutex::new(()),
            last_sweep: Mutex::new(None),
        }
    }

    /// Run one full sweep over every active item, sequentially.
    ///
    /// One item's fetch failure never aborts the sweep; the inter-item
    /// delay is part of the contract toward the origin server.
    pub async fn run_sweep(&self) -> Result<Vec<StateChangeEvent>> {
        let _guard = self.sweep_lock.lock().await;

        let mut items = self.store.load_all().await?;
        let active: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.active)
            .map(|(index, _)| index)
            .collect();

        log::info!(
            "Sweep starting: {} active of {} tracked items",
            active.len(),
            items.len()
        );

        let delay = Duration::from_secs(self.config.item_delay_secs);
        let mut events = Vec::new();

        for (position, &index) in active.iter().enumerate() {
            if position > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = match self.check_item(&items[index]).await {
                Ok(result) => result,
                Err(error) => {
                    log::warn!("Fetch failed for {}: {}", items[index].id, error);
                    self.sink.on_fetch_error(&items[index].id, &error).await;
                    continue;
                }
            };

            let previous = Verdict::from_bool(items[index].last_known_in_stock);
            log::debug!("{}: {}", result.id, result.verdict.label());

            if result.verdict != previous {
                items[index].last_known_in_stock = result.verdict.is_in_stock();
                self.store.save_all(&items).await?;

                let event = StateChangeEvent {
                    id: items[index].id.clone(),
                    url_fragment: items[index].url_fragment.clone(),
                    previous,
                    current: result.verdict,
                    detected_at: result.fetched_at,
                };
                self.sink.on_state_change(&event).await;
                events.push(event);
            }
        }

        let finished_at = Utc::now();
        *self.last_sweep.lock().await = Some(finished_at);
        self.sink.on_sweep_complete(finished_at, active.len()).await;

        log::info!(
            "Sweep finished: {} checked, {} transitions",
            active.len(),
            events.len()
        );
        Ok(events)
    }

    /// Fetch and classify one item.
    async fn check_item(&self, item: &TrackedItem) -> std::result::Result<CheckResult, FetchError> {
        let url = item.product_url(&self.config.base_url);
        log::debug!("Checking {} at {}", item.id, url);

        let body = self.source.fetch(&url).await?;
        let document = Html::parse_document(&body);

        Ok(CheckResult {
            id: item.id.clone(),
            verdict: self.classifier.classify(&document),
            fetched_at: Utc::now(),
        })
    }

    /// Mark exactly the given ids active and all others inactive.
    ///
    /// Reactivated items forget their last verdict, so the next sweep
    /// treats them as first observations.
    pub async fn set_active(&self, ids: &HashSet<String>) -> Result<Vec<TrackedItem>> {
        let _guard = self.sweep_lock.lock().await;

        let mut items = self.store.load_all().await?;
        for id in ids {
            if !items.iter().any(|item| &item.id == id) {
                log::warn!("Unknown item id '{}' in tracking update", id);
            }
        }

        for item in &mut items {
            let activate = ids.contains(&item.id);
            if activate && !item.active {
                item.last_known_in_stock = false;
            }
            item.active = activate;
        }
        self.store.save_all(&items).await?;
        Ok(items)
    }

    /// Answer an ad-hoc status query.
    pub async fn status(&self) -> Result<EngineStatus> {
        let items = self.store.load_all().await?;
        Ok(EngineStatus {
            last_sweep_at: *self.last_sweep.lock().await,
            items: items
                .into_iter()
                .map(|item| ItemStatus {
                    id: item.id,
                    active: item.active,
                    in_stock: item.last_known_in_stock,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::models::{CatalogItem, ClassifierConfig};
    use crate::storage::JsonStore;

    const IN_STOCK: &str = r#"<html><body>
        <button type="submit">Add to cart</button>
    </body></html>"#;

    const SOLD_OUT: &str = r#"<html><body>
        <button type="submit">Sold out</button>
    </body></html>"#;

    /// Serves canned pages and records every requested URL. A URL with no
    /// page registered fails with a timeout.
    struct StaticPages {
        pages: StdMutex<HashMap<String, String>>,
        requests: StdMutex<Vec<String>>,
    }

    impl StaticPages {
        fn new() -> Self {
            Self {
                pages: StdMutex::new(HashMap::new()),
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn set(&self, url: &str, body: &str) {
            self.pages
                .lock()
                .unwrap()
                .insert(url.to_string(), body.to_string());
        }

        fn requested(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for StaticPages {
        async fn fetch(&self, url: &str) -> std::result::Result<String, FetchError> {
            self.requests.lock().unwrap().push(url.to_string());
            self.pages
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or(FetchError::Timeout)
        }
    }

    /// Records everything the engine emits.
    #[derive(Default)]
    struct RecordingSink {
        changes: StdMutex<Vec<StateChangeEvent>>,
        errors: StdMutex<Vec<String>>,
        sweeps: StdMutex<Vec<usize>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn on_state_change(&self, event: &StateChangeEvent) {
            self.changes.lock().unwrap().push(event.clone());
        }

        async fn on_fetch_error(&self, id: &str, _error: &FetchError) {
            self.errors.lock().unwrap().push(id.to_string());
        }

        async fn on_sweep_complete(&self, _at: DateTime<Utc>, item_count: usize) {
            self.sweeps.lock().unwrap().push(item_count);
        }
    }

    fn test_config() -> WatcherConfig {
        WatcherConfig {
            base_url: "https://shop.test".to_string(),
            item_delay_secs: 0,
            ..WatcherConfig::default()
        }
    }

    fn catalog() -> Vec<CatalogItem> {
        vec![
            CatalogItem {
                id: "sayaka".to_string(),
                url_fragment: "/products/sayaka".to_string(),
            },
            CatalogItem {
                id: "ummon".to_string(),
                url_fragment: "/products/ummon".to_string(),
            },
        ]
    }

    struct Fixture {
        engine: SweepEngine,
        pages: Arc<StaticPages>,
        sink: Arc<RecordingSink>,
        store: Arc<JsonStore>,
        _tmp: TempDir,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let pages = Arc::new(StaticPages::new());
        let sink = Arc::new(RecordingSink::default());
        let store = Arc::new(JsonStore::new(tmp.path(), catalog()));
        let classifier = StockClassifier::from_config(&ClassifierConfig::default()).unwrap();

        let engine = SweepEngine::new(
            test_config(),
            Arc::clone(&pages) as Arc<dyn PageSource>,
            classifier,
            Arc::clone(&store) as Arc<dyn ItemStore>,
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );

        Fixture {
            engine,
            pages,
            sink,
            store,
            _tmp: tmp,
        }
    }

    #[tokio::test]
    async fn test_restock_then_sellout_scenario() {
        let f = fixture();
        f.pages.set("https://shop.test/products/sayaka", IN_STOCK);
        f.pages.set("https://shop.test/products/ummon", SOLD_OUT);

        // Sweep 1: sayaka transitions false -> true (first-seen in stock
        // notifies); ummon stays out of stock.
        let events = f.engine.run_sweep().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "sayaka");
        assert_eq!(events[0].previous, Verdict::OutOfStock);
        assert_eq!(events[0].current, Verdict::InStock);

        // Sweep 2: nothing changed, nothing emitted.
        let events = f.engine.run_sweep().await.unwrap();
        assert!(events.is_empty());

        // Sweep 3: sayaka sells out.
        f.pages.set("https://shop.test/products/sayaka", SOLD_OUT);
        let events = f.engine.run_sweep().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "sayaka");
        assert!(!events[0].is_restock());

        let changes = f.sink.changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_persists_verdicts() {
        let f = fixture();
        f.pages.set("https://shop.test/products/sayaka", IN_STOCK);
        f.pages.set("https://shop.test/products/ummon", SOLD_OUT);

        f.engine.run_sweep().await.unwrap();

        let items = f.store.load_all().await.unwrap();
        let sayaka = items.iter().find(|i| i.id == "sayaka").unwrap();
        let ummon = items.iter().find(|i| i.id == "ummon").unwrap();
        assert!(sayaka.last_known_in_stock);
        assert!(!ummon.last_known_in_stock);
    }

    #[tokio::test]
    async fn test_fetch_error_surfaces_and_sweep_continues() {
        let f = fixture();
        // sayaka has no page registered -> timeout; ummon is fine.
        f.pages.set("https://shop.test/products/ummon", IN_STOCK);

        let events = f.engine.run_sweep().await.unwrap();

        // ummon was still checked and produced its transition.
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "ummon");

        let errors = f.sink.errors.lock().unwrap().clone();
        assert_eq!(errors, vec!["sayaka".to_string()]);

        // The failed item's stored verdict is untouched.
        let items = f.store.load_all().await.unwrap();
        let sayaka = items.iter().find(|i| i.id == "sayaka").unwrap();
        assert!(!sayaka.last_known_in_stock);
    }

    #[tokio::test]
    async fn test_set_active_excludes_from_sweep() {
        let f = fixture();
        f.pages.set("https://shop.test/products/sayaka", IN_STOCK);
        f.pages.set("https://shop.test/products/ummon", IN_STOCK);

        let ids: HashSet<String> = ["sayaka".to_string()].into_iter().collect();
        let items = f.engine.set_active(&ids).await.unwrap();
        assert!(!items.iter().find(|i| i.id == "ummon").unwrap().active);

        f.engine.run_sweep().await.unwrap();

        let requested = f.pages.requested();
        assert_eq!(requested, vec!["https://shop.test/products/sayaka"]);
    }

    #[tokio::test]
    async fn test_reactivation_resets_verdict() {
        let f = fixture();
        f.pages.set("https://shop.test/products/sayaka", IN_STOCK);
        f.pages.set("https://shop.test/products/ummon", IN_STOCK);

        // Both seen in stock.
        f.engine.run_sweep().await.unwrap();

        // Deactivate ummon, then bring it back.
        let only_sayaka: HashSet<String> = ["sayaka".to_string()].into_iter().collect();
        f.engine.set_active(&only_sayaka).await.unwrap();

        let both: HashSet<String> = ["sayaka".to_string(), "ummon".to_string()]
            .into_iter()
            .collect();
        let items = f.engine.set_active(&both).await.unwrap();
        let ummon = items.iter().find(|i| i.id == "ummon").unwrap();
        assert!(ummon.active);
        assert!(!ummon.last_known_in_stock);

        // First observation after resuming tracking notifies again.
        let events = f.engine.run_sweep().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "ummon");
        assert!(events[0].is_restock());
    }

    #[tokio::test]
    async fn test_status_reports_last_sweep_and_items() {
        let f = fixture();
        f.pages.set("https://shop.test/products/sayaka", IN_STOCK);
        f.pages.set("https://shop.test/products/ummon", SOLD_OUT);

        let status = f.engine.status().await.unwrap();
        assert!(status.last_sweep_at.is_none());

        f.engine.run_sweep().await.unwrap();

        let status = f.engine.status().await.unwrap();
        assert!(status.last_sweep_at.is_some());
        assert_eq!(status.items.len(), 2);
        let sayaka = status.items.iter().find(|i| i.id == "sayaka").unwrap();
        assert!(sayaka.in_stock);
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_serialize() {
        let f = fixture();
        f.pages.set("https://shop.test/products/sayaka", IN_STOCK);
        f.pages.set("https://shop.test/products/ummon", IN_STOCK);

        let engine = Arc::new(f.engine);
        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_sweep().await.unwrap() }
        });
        let second = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run_sweep().await.unwrap() }
        });

        let (a, b) = (first.await.unwrap(), second.await.unwrap());

        // Exactly one of the two sweeps observed the transitions; the other
        // queued behind it and saw a store already up to date.
        assert_eq!(a.len() + b.len(), 2);
        assert_eq!(f.sink.sweeps.lock().unwrap().len(), 2);
    }
}
