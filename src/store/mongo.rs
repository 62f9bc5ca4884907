//! MongoDB-backed document store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, ReadPreference, SelectionCriteria};
use mongodb::{Client, Collection};
use tracing::{debug, info, instrument};

use crate::config::StoreConfig;
use crate::error::StoreError;

use super::DocumentStore;

/// Store backed by a pooled MongoDB client.
///
/// Built once at startup; the driver's pool is shared by every request.
#[derive(Debug, Clone)]
pub struct MongoStore {
    /// Driver client (internally pooled).
    client: Client,
    /// Bound applied to each operation.
    timeout: Duration,
}

impl MongoStore {
    /// Connect to MongoDB and ping the primary.
    #[instrument(skip(config), fields(timeout_secs = config.timeout.as_secs()))]
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let after_secs = config.timeout.as_secs();

        let mut options = tokio::time::timeout(config.timeout, ClientOptions::parse(&config.uri))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "resolve connection string",
                after_secs,
            })?
            .map_err(StoreError::Connect)?;
        options.connect_timeout = Some(config.timeout);
        options.server_selection_timeout = Some(config.timeout);

        let client = Client::with_options(options).map_err(StoreError::Connect)?;

        tokio::time::timeout(config.timeout, ping_primary(&client))
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "ping MongoDB",
                after_secs,
            })?
            .map_err(StoreError::Connect)?;

        info!("Connected to MongoDB");

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    /// Handle to a collection of raw documents.
    pub fn collection(&self, database: &str, collection: &str) -> Collection<Document> {
        self.client.database(database).collection(collection)
    }

    /// Run `fut` under the configured bound, mapping driver errors.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = mongodb::error::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(StoreError::Query { operation, source }),
            Err(_) => Err(StoreError::Timeout {
                operation,
                after_secs: self.timeout.as_secs(),
            }),
        }
    }
}

async fn ping_primary(client: &Client) -> mongodb::error::Result<()> {
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .selection_criteria(SelectionCriteria::ReadPreference(ReadPreference::Primary))
        .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded("ping MongoDB", ping_primary(&self.client)).await
    }

    #[instrument(skip(self, filter))]
    async fn find(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection(database, collection);

        let documents = self
            .bounded("query collection", async move {
                let cursor = coll.find(filter).await?;
                cursor.try_collect::<Vec<Document>>().await
            })
            .await?;

        debug!(count = documents.len(), "Query returned documents");
        Ok(documents)
    }

    #[instrument(skip(self, pipeline), fields(stages = pipeline.len()))]
    async fn aggregate(
        &self,
        database: &str,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection(database, collection);

        let documents = self
            .bounded("run aggregation", async move {
                let cursor = coll.aggregate(pipeline).await?;
                cursor.try_collect::<Vec<Document>>().await
            })
            .await?;

        debug!(count = documents.len(), "Aggregation returned documents");
        Ok(documents)
    }

    #[instrument(skip(self, document))]
    async fn insert_one(
        &self,
        database: &str,
        collection: &str,
        document: Document,
    ) -> Result<(), StoreError> {
        let coll = self.collection(database, collection);
        self.bounded("insert document", async move { coll.insert_one(document).await })
            .await?;
        Ok(())
    }

    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn insert_many(
        &self,
        database: &str,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<usize, StoreError> {
        // The driver rejects empty batches.
        if documents.is_empty() {
            return Ok(0);
        }

        let coll = self.collection(database, collection);
        let result = self
            .bounded("insert documents", async move { coll.insert_many(documents).await })
            .await?;
        Ok(result.inserted_ids.len())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        tokio::time::timeout(self.timeout, self.client.clone().shutdown())
            .await
            .map_err(|_| StoreError::Timeout {
                operation: "disconnect from MongoDB",
                after_secs: self.timeout.as_secs(),
            })?;
        info!("Disconnected from MongoDB");
        Ok(())
    }
}
