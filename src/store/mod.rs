//! Key/value persistence for the learning engine. Each key holds one JSON blob; last write wins.

use std::future::Future;

use crate::error::StoreError;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub const KEY_BASIC: &str = "learning:basic";
pub const KEY_ADVANCED: &str = "learning:advanced";
pub const KEY_CONFIG: &str = "strategy:config";
pub const KEY_METRICS: &str = "strategy:metrics";

pub const ALL_KEYS: [&str; 4] = [KEY_BASIC, KEY_ADVANCED, KEY_CONFIG, KEY_METRICS];

pub trait StateStore: Send + Sync {
    fn load_json(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn save_json(
        &self,
        key: &str,
        blob: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All entries land or none do.
    fn save_many(
        &self,
        entries: &[(&str, String)],
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;
}
