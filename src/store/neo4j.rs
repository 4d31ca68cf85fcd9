//! Neo4j-backed [`Store`].
//!
//! Each entry is a `(:CacheEntry {collection, key, payload})` node; `MERGE`
//! on `(collection, key)` gives upsert semantics.

use std::fmt::Display;

use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::{debug, info};

use super::{Collection, Store};
use crate::{Error, Result};

pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect to Neo4j server and make sure the lookup index exists.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password).await?;
        let store = Self { graph };
        store.init_schema().await?;
        info!(%uri, "Connected to Neo4j store");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        self.graph
            .run(query(
                "CREATE INDEX cache_entry_key IF NOT EXISTS FOR (c:CacheEntry) ON (c.collection, c.key)",
            ))
            .await?;
        Ok(())
    }
}

/// A present entry whose payload cannot be read is an error, not a miss.
fn decode_payload<E: Display>(
    decoded: std::result::Result<String, E>,
    collection: Collection,
    key: &str,
) -> Result<String> {
    decoded.map_err(|e| {
        Error::Store(format!(
            "Malformed payload for {} entry '{}': {}",
            collection, key, e
        ))
    })
}

#[async_trait]
impl Store for Neo4jStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>> {
        let q = query(
            "MATCH (c:CacheEntry {collection: $collection, key: $key})
             RETURN c.payload AS payload
             LIMIT 1",
        )
        .param("collection", collection.as_str())
        .param("key", key);

        let mut result = self.graph.execute(q).await?;
        match result.next().await? {
            Some(row) => decode_payload(row.get::<String>("payload"), collection, key).map(Some),
            None => Ok(None),
        }
    }

    async fn put(&self, collection: Collection, key: &str, payload: String) -> Result<()> {
        let q = query(
            "MERGE (c:CacheEntry {collection: $collection, key: $key})
             SET c.payload = $payload,
                 c.updated_at = datetime()",
        )
        .param("collection", collection.as_str())
        .param("key", key)
        .param("payload", payload);

        self.graph.run(q).await?;
        debug!(%collection, key, "Stored cache entry");
        Ok(())
    }

    async fn clear_all(&self) -> Result<()> {
        self.graph.run(query("MATCH (n) DETACH DELETE n")).await?;
        info!("Cleared all data from Neo4j store");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut result = self.graph.execute(query("RETURN 1 AS ok")).await?;
        result.next().await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "neo4j"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readable_payload_passes_through() {
        let payload = decode_payload::<String>(Ok("{}".to_string()), Collection::Graph, "k").unwrap();
        assert_eq!(payload, "{}");
    }

    #[test]
    fn test_malformed_payload_is_store_error() {
        let err = decode_payload(
            Err("expected String, found Integer"),
            Collection::Summary,
            "doc_1",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.to_string().contains("doc_1"));
    }
}
