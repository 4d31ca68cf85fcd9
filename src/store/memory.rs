//! In-memory [`Store`] for tests and single-process deployments.
//!
//! One `HashMap` per collection behind a `std::sync::RwLock`. Locks are never
//! held across an await point.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{Collection, Store};
use crate::{Error, Result};

pub struct MemoryStore {
    entries: RwLock<HashMap<Collection, HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of keys held in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.entries
            .read()
            .map(|entries| entries.get(&collection).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .map(|entries| entries.values().all(HashMap::is_empty))
            .unwrap_or(true)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> Error {
    Error::Store("memory store lock poisoned".to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(&collection)
            .and_then(|items| items.get(key))
            .cloned())
    }

    async fn put(&self, collection: Collection, key: &str, payload: String) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries
            .entry(collection)
            .or_default()
            .insert(key.to_string(), payload);
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.clear();
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
