//! Document store access.
//!
//! This module handles:
//! - The [`DocumentStore`] trait the correlator and orchestrator depend on
//! - A MongoDB-backed store with bounded operations
//! - An in-memory store for tests and local runs

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use mongodb::bson::Document;

use crate::error::StoreError;

pub use memory::{MemoryConfig, MemoryStore};
pub use mongo::MongoStore;

/// Operations the service needs from a document database.
///
/// Implementations must be safe to share across request tasks.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Check the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Return every document in `collection` matching `filter`, in store order.
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<Document>, StoreError>;

    /// Return every document in `collection`.
    async fn find_all(&self, database: &str, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.find(database, collection, Document::new()).await
    }

    /// Run an aggregation pipeline over `collection`.
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError>;

    /// Insert a single document.
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), StoreError>;

    /// Insert documents, returning how many were written.
    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, StoreError>;

    /// Release connections held by the store.
    async fn disconnect(&self) -> Result<(), StoreError>;
}
