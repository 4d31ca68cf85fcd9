//! Typed checkpoint contract over a [`Store`].
//!
//! `checkpoint(key, compute)`: on hit return the stored value with no side
//! effects; on miss run `compute`, persist its result under `key`, then return
//! it. Compute closures may nest further checkpoints.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::metrics;
use crate::store::{Collection, Store};
use crate::Result;

#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn Store>,
}

impl Cache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Typed lookup. A payload that no longer deserializes counts as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<T>> {
        let Some(payload) = self.store.get(collection, key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                debug!(%collection, key, error = %err, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    pub async fn put<T: Serialize + ?Sized>(
        &self,
        collection: Collection,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.store.put(collection, key, payload).await
    }

    /// Look up `key`; on a miss compute, persist and return.
    pub async fn checkpoint<T, F, Fut>(&self, collection: Collection, key: &str, compute: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.checkpoint_if(collection, key, |_| true, compute).await
    }

    /// Like [`Cache::checkpoint`], but a stored value rejected by `usable`
    /// is treated as a miss.
    pub async fn checkpoint_if<T, P, F, Fut>(
        &self,
        collection: Collection,
        key: &str,
        usable: P,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        P: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(collection, key).await? {
            if usable(&value) {
                metrics::record_cache_lookup(collection.as_str(), true);
                debug!(%collection, key, "Cache hit");
                return Ok(value);
            }
        }

        metrics::record_cache_lookup(collection.as_str(), false);
        debug!(%collection, key, "Cache miss");
        let value = compute().await?;
        self.put(collection, key, &value).await?;
        Ok(value)
    }
}

/// Non-empty list predicate for [`Cache::checkpoint_if`].
pub fn non_empty<T>(items: &Vec<T>) -> bool {
    !items.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> (Arc<MemoryStore>, Cache) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Cache::new(store))
    }

    #[tokio::test]
    async fn miss_computes_and_persists() {
        let (store, cache) = cache();
        let calls = AtomicUsize::new(0);

        let value: String = cache
            .checkpoint(Collection::QueryAnswer, "k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("answer".to_string())
            })
            .await
            .unwrap();

        assert_eq!(value, "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get(Collection::QueryAnswer, "k").await.unwrap(),
            Some("\"answer\"".to_string())
        );
    }

    #[tokio::test]
    async fn hit_skips_compute() {
        let (_store, cache) = cache();
        cache
            .put(Collection::QueryAnswer, "k", &"cached".to_string())
            .await
            .unwrap();

        let calls = AtomicUsize::new(0);
        let value: String = cache
            .checkpoint(Collection::QueryAnswer, "k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("recomputed".to_string())
            })
            .await
            .unwrap();

        assert_eq!(value, "cached");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compute_error_is_not_persisted() {
        let (store, cache) = cache();

        let result: Result<String> = cache
            .checkpoint(Collection::Graph, "k", || async {
                Err::<String, _>(crate::Error::Inference("boom".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(store.len(Collection::Graph), 0);
    }

    #[tokio::test]
    async fn empty_list_is_treated_as_miss() {
        let (_store, cache) = cache();
        cache
            .put(Collection::CommunitySummary, "h", &Vec::<String>::new())
            .await
            .unwrap();

        let value: Vec<String> = cache
            .checkpoint_if(Collection::CommunitySummary, "h", non_empty, || async {
                Ok(vec!["fresh".to_string()])
            })
            .await
            .unwrap();

        assert_eq!(value, vec!["fresh".to_string()]);
        let stored: Option<Vec<String>> =
            cache.get(Collection::CommunitySummary, "h").await.unwrap();
        assert_eq!(stored, Some(vec!["fresh".to_string()]));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_miss() {
        let (store, cache) = cache();
        store
            .put(Collection::Graph, "k", "not json".into())
            .await
            .unwrap();

        let value: Option<u32> = cache.get(Collection::Graph, "k").await.unwrap();
        assert_eq!(value, None);
    }
}
