//! In-memory document store for tests and local runs.
//!
//! Filters support the subset of query syntax the service issues: field
//! equality, `$or` over sub-filters, and `{"$in": [...]}` on a field.
//! Pipelines support `$match` and `$limit` stages.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};

use crate::error::StoreError;

use super::DocumentStore;

/// Configuration for in-memory store behavior.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Whether to fail pings.
    pub fail_ping: bool,
    /// Collections whose reads fail.
    pub fail_collections: HashSet<String>,
    /// Whether to fail every write.
    pub fail_writes: bool,
}

type Collections = HashMap<(String, String), Vec<Document>>;

/// Document store held in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Failure injection.
    config: MemoryConfig,
    /// Documents keyed by (database, collection), in insertion order.
    collections: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store with failure injection.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            config,
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Make reads of `collection` fail from now on.
    pub fn fail_collection(&mut self, collection: impl Into<String>) {
        self.config.fail_collections.insert(collection.into());
    }

    /// Append documents to a collection without going through the trait.
    pub fn seed(&self, database: &str, collection: &str, documents: Vec<Document>) {
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections
            .entry((database.to_string(), collection.to_string()))
            .or_default()
            .extend(documents);
    }

    /// Number of documents in a collection.
    pub fn len(&self, database: &str, collection: &str) -> usize {
        self.read()
            .get(&(database.to_string(), collection.to_string()))
            .map_or(0, Vec::len)
    }

    /// Whether a collection is empty or absent.
    pub fn is_empty(&self, database: &str, collection: &str) -> bool {
        self.len(database, collection) == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Collections> {
        self.collections
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of a collection, honoring injected read failures.
    fn snapshot(&self, database: &str, collection: &str) -> Result<Vec<Document>, StoreError> {
        if self.config.fail_collections.contains(collection) {
            return Err(StoreError::Unavailable(format!(
                "collection {} is unreadable",
                collection
            )));
        }

        Ok(self
            .read()
            .get(&(database.to_string(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.config.fail_writes {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }
}

/// Whether `document` satisfies `filter`.
pub fn matches(document: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, condition)| {
        if key == "$or" {
            return match condition {
                Bson::Array(branches) => branches.iter().any(|branch| match branch {
                    Bson::Document(sub) => matches(document, sub),
                    _ => false,
                }),
                _ => false,
            };
        }

        let value = document.get(key);
        match condition {
            Bson::Document(operator) if operator.contains_key("$in") => {
                match (operator.get("$in"), value) {
                    (Some(Bson::Array(candidates)), Some(value)) => candidates.contains(value),
                    _ => false,
                }
            }
            expected => value == Some(expected),
        }
    })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        if self.config.fail_ping {
            return Err(StoreError::Unavailable("ping failed".to_string()));
        }
        Ok(())
    }

    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<Document>, StoreError> {
        let mut documents = self.snapshot(database, collection)?;
        documents.retain(|document| matches(document, &filter));
        Ok(documents)
    }

    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let mut documents = self.snapshot(database, collection)?;

        for stage in &pipeline {
            match stage.iter().next() {
                Some((name, Bson::Document(filter))) if name == "$match" => {
                    documents.retain(|document| matches(document, filter));
                }
                Some((name, limit)) if name == "$limit" => {
                    let limit = match limit {
                        Bson::Int32(n) => usize::try_from(*n).ok(),
                        Bson::Int64(n) => usize::try_from(*n).ok(),
                        _ => None,
                    }
                    .ok_or_else(|| StoreError::UnsupportedStage(stage.to_string()))?;
                    documents.truncate(limit);
                }
                _ => return Err(StoreError::UnsupportedStage(stage.to_string())),
            }
        }

        Ok(documents)
    }

    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.seed(database, collection, vec![document]);
        Ok(())
    }

    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, StoreError> {
        self.check_writable()?;
        let count = documents.len();
        self.seed(database, collection, documents);
        Ok(count)
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
