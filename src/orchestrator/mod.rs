//! Cluster orchestrator service wrappers.
//!
//! This module handles:
//! - Creating, reading and listing Services in a namespace
//! - Recording created services in the document store
//! - Retrying transient creation failures

pub mod kubernetes;
pub mod memory;
pub mod retry;

use async_trait::async_trait;
use mongodb::bson::to_document;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{OrchestratorError, StoreError};
use crate::store::DocumentStore;
use crate::traffic::ServiceRecord;

pub use kubernetes::KubeRegistry;
pub use memory::MemoryRegistry;
pub use retry::{retry, RetryPolicy};

/// Name, ClusterIP and first port of a Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceData {
    /// Service name.
    pub name: String,
    /// ClusterIP; empty when not yet assigned.
    pub ip: String,
    /// Listening port.
    pub port: i32,
}

/// Create/get/list access to Services.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Create a Service; returns it as stored by the orchestrator.
    async fn create(
        &self,
        namespace: &str,
        service: &ServiceData,
    ) -> Result<ServiceData, OrchestratorError>;

    /// Fetch a Service by name.
    async fn get(&self, namespace: &str, name: &str) -> Result<ServiceData, OrchestratorError>;

    /// All Services in a namespace.
    async fn list(&self, namespace: &str) -> Result<Vec<ServiceData>, OrchestratorError>;
}

/// Where created services are recorded.
#[derive(Debug, Clone)]
pub struct RecordTarget {
    /// Database name.
    pub database: String,
    /// Collection name.
    pub collection: String,
}

/// Create `service` with retries, then record it as a service document.
#[instrument(skip(registry, store, target, service, policy), fields(service = %service.name))]
pub async fn create_service(
    registry: &dyn ServiceRegistry,
    store: &dyn DocumentStore,
    target: &RecordTarget,
    namespace: &str,
    service: &ServiceData,
    policy: &RetryPolicy,
) -> Result<ServiceData, OrchestratorError> {
    let created = retry(policy, "create service", || registry.create(namespace, service)).await?;

    let record = ServiceRecord {
        name: created.name.clone(),
        ip_address: created.ip.clone(),
        listening_port: Some(i64::from(created.port)),
    };
    let document = to_document(&record).map_err(StoreError::from)?;
    store
        .insert_one(&target.database, &target.collection, document)
        .await?;

    info!(ip = %created.ip, port = created.port, "Service created and recorded");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryConfig, MemoryStore};
    use mongodb::bson::doc;

    fn target() -> RecordTarget {
        RecordTarget {
            database: "testdb".to_string(),
            collection: "testcollection".to_string(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_delay_ms: 1,
            max_delay_ms: 1,
            ..Default::default()
        }
    }

    fn test_service() -> ServiceData {
        ServiceData {
            name: "test-service".to_string(),
            ip: "10.0.0.1".to_string(),
            port: 2332,
        }
    }

    #[tokio::test]
    async fn created_service_is_recorded() {
        let registry = MemoryRegistry::new();
        let store = MemoryStore::new();

        let created = create_service(
            &registry,
            &store,
            &target(),
            "default",
            &test_service(),
            &fast_policy(),
        )
        .await
        .unwrap();

        assert_eq!(created.name, "test-service");
        let recorded = store
            .find("testdb", "testcollection", doc! { "name": "test-service" })
            .await
            .unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].get_str("ip_address").unwrap(), "10.0.0.1");
        assert_eq!(recorded[0].get_i64("listening_port").unwrap(), 2332);
    }

    #[tokio::test]
    async fn creation_retries_transient_failures() {
        let registry = MemoryRegistry::new();
        registry.fail_next_creates(2);
        let store = MemoryStore::new();

        let result = create_service(
            &registry,
            &store,
            &target(),
            "default",
            &test_service(),
            &fast_policy(),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(registry.create_calls(), 3);
    }

    #[tokio::test]
    async fn record_failure_is_reported() {
        let registry = MemoryRegistry::new();
        let store = MemoryStore::with_config(MemoryConfig {
            fail_writes: true,
            ..Default::default()
        });

        let err = create_service(
            &registry,
            &store,
            &target(),
            "default",
            &test_service(),
            &fast_policy(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, OrchestratorError::Record(_)));
    }
}
