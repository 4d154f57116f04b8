//! Local JSON file storage.
//!
//! Persists the tracked-item collection as one keyed document, written
//! atomically (write to temp, then rename) so a crash mid-sweep cannot
//! leave a half-updated collection on disk.
//!
//! A present-but-unreadable file is an error, never a reseed: tracked state
//! is not silently discarded. Seeding from the catalog happens only when the
//! file does not exist at all.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{CatalogItem, TrackedItem};
use crate::storage::ItemStore;

const STORE_FILE: &str = "items.json";

/// Per-item state as persisted, keyed by item id in [`StoreData`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ItemRecord {
    url_fragment: String,
    active: bool,
    last_known_in_stock: bool,
}

/// On-disk document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreData {
    updated_at: DateTime<Utc>,
    items: BTreeMap<String, ItemRecord>,
}

/// JSON file storage backend.
#[derive(Clone)]
pub struct JsonStore {
    root_dir: PathBuf,
    catalog: Vec<CatalogItem>,
}

impl JsonStore {
    /// Create a store rooted at the given directory. `catalog` seeds the
    /// collection on first-ever run.
    pub fn new(root_dir: impl Into<PathBuf>, catalog: Vec<CatalogItem>) -> Self {
        Self {
            root_dir: root_dir.into(),
            catalog,
        }
    }

    fn path(&self) -> PathBuf {
        self.root_dir.join(STORE_FILE)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path()).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Fresh collection from the configured catalog: every item active,
    /// never seen in stock.
    fn seed(&self) -> Vec<TrackedItem> {
        self.catalog
            .iter()
            .map(|entry| TrackedItem::new(&entry.id, &entry.url_fragment))
            .collect()
    }
}

#[async_trait]
impl ItemStore for JsonStore {
    async fn load_all(&self) -> Result<Vec<TrackedItem>> {
        match self.read_bytes().await? {
            Some(bytes) => {
                let data: StoreData = serde_json::from_slice(&bytes)?;
                Ok(data
                    .items
                    .into_iter()
                    .map(|(id, record)| TrackedItem {
                        id,
                        url_fragment: record.url_fragment,
                        active: record.active,
                        last_known_in_stock: record.last_known_in_stock,
                    })
                    .collect())
            }
            None => {
                log::info!(
                    "No {} found, seeding {} catalog items",
                    STORE_FILE,
                    self.catalog.len()
                );
                Ok(self.seed())
            }
        }
    }

    async fn save_all(&self, items: &[TrackedItem]) -> Result<()> {
        let mut map = BTreeMap::new();
        for item in items {
            let record = ItemRecord {
                url_fragment: item.url_fragment.clone(),
                active: item.active,
                last_known_in_stock: item.last_known_in_stock,
            };
            if map.insert(item.id.clone(), record).is_some() {
                return Err(AppError::store(format!("duplicate item id '{}'", item.id)));
            }
        }

        let data = StoreData {
            updated_at: Utc::now(),
            items: map,
        };
        let bytes = serde_json::to_vec_pretty(&data)?;
        self.write_bytes(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn catalog() -> Vec<CatalogItem> {
        vec![
            CatalogItem {
                id: "sayaka".to_string(),
                url_fragment: "/products/sayaka-no-mukashi".to_string(),
            },
            CatalogItem {
                id: "ummon".to_string(),
                url_fragment: "/products/ummon-no-mukashi".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn test_first_run_seeds_catalog() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path(), catalog());

        let items = store.load_all().await.unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.active));
        assert!(items.iter().all(|i| !i.last_known_in_stock));
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path(), catalog());

        let mut items = store.load_all().await.unwrap();
        items[0].last_known_in_stock = true;
        items[1].active = false;
        store.save_all(&items).await.unwrap();

        let mut loaded = store.load_all().await.unwrap();
        // The on-disk map is keyed, so order back out is by id
        loaded.sort_by(|a, b| a.id.cmp(&b.id));
        items.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(loaded, items);
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path(), catalog());

        let items = store.load_all().await.unwrap();
        store.save_all(&items).await.unwrap();

        assert!(tmp.path().join(STORE_FILE).exists());
        assert!(!tmp.path().join("items.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_errors_instead_of_reseeding() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path(), catalog());

        tokio::fs::write(tmp.path().join(STORE_FILE), b"{not json")
            .await
            .unwrap();

        assert!(store.load_all().await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path(), catalog());

        let items = vec![
            TrackedItem::new("sayaka", "/products/a"),
            TrackedItem::new("sayaka", "/products/b"),
        ];
        assert!(matches!(
            store.save_all(&items).await,
            Err(AppError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_save_overwrites_previous_collection() {
        let tmp = TempDir::new().unwrap();
        let store = JsonStore::new(tmp.path(), catalog());

        let items = store.load_all().await.unwrap();
        store.save_all(&items).await.unwrap();
        store.save_all(&items[..1]).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
    }
}
