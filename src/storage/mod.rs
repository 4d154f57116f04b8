//! Item state persistence.
//!
//! The store exclusively owns the persisted tracked-item collection; the
//! engine holds it only for the duration of a sweep (read-modify-write).
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Watcher configuration
//! └── items.json            # Tracked items, keyed by id
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::TrackedItem;

// Re-export for convenience
pub use local::JsonStore;

/// Trait for tracked-item storage backends.
///
/// Both operations act on the whole collection; there is no row-level API.
/// `save_all` must be atomic with respect to a concurrent `load_all` and to
/// crashes: no reader may ever observe a partially written collection.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Load every tracked item, seeding from the default catalog when no
    /// persisted state exists yet.
    async fn load_all(&self) -> Result<Vec<TrackedItem>>;

    /// Replace the persisted collection.
    async fn save_all(&self, items: &[TrackedItem]) -> Result<()>;
}
