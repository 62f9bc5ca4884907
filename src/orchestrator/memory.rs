//! In-memory service registry for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::OrchestratorError;

use super::{ServiceData, ServiceRegistry};

/// Registry keeping services per namespace in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    services: Arc<Mutex<HashMap<String, Vec<ServiceData>>>>,
    /// Remaining creates that fail with a transient error.
    failing_creates: Arc<AtomicU32>,
    /// Create calls seen, including failed ones.
    create_calls: Arc<AtomicU32>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` creates fail with `Unavailable`.
    pub fn fail_next_creates(&self, count: u32) {
        self.failing_creates.store(count, Ordering::SeqCst);
    }

    /// Number of create calls made so far.
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<ServiceData>>> {
        self.services
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    async fn create(
        &self,
        namespace: &str,
        service: &ServiceData,
    ) -> Result<ServiceData, OrchestratorError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let injected = self
            .failing_creates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(OrchestratorError::Unavailable(
                "injected create failure".to_string(),
            ));
        }

        let mut services = self.lock();
        let entries = services.entry(namespace.to_string()).or_default();
        if entries.iter().any(|existing| existing.name == service.name) {
            return Err(OrchestratorError::AlreadyExists {
                namespace: namespace.to_string(),
                name: service.name.clone(),
            });
        }

        // Mimic the cluster assigning a ClusterIP.
        let mut created = service.clone();
        if created.ip.is_empty() {
            created.ip = format!("10.96.0.{}", entries.len() + 1);
        }
        entries.push(created.clone());
        Ok(created)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<ServiceData, OrchestratorError> {
        self.lock()
            .get(namespace)
            .and_then(|entries| entries.iter().find(|service| service.name == name))
            .cloned()
            .ok_or_else(|| OrchestratorError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list(&self, namespace: &str) -> Result<Vec<ServiceData>, OrchestratorError> {
        Ok(self.lock().get(namespace).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web(ip: &str) -> ServiceData {
        ServiceData {
            name: "web".to_string(),
            ip: ip.to_string(),
            port: 80,
        }
    }

    #[tokio::test]
    async fn create_assigns_ip_and_rejects_duplicates() {
        let registry = MemoryRegistry::new();

        let created = registry.create("default", &web("")).await.unwrap();
        assert_eq!(created.ip, "10.96.0.1");

        let err = registry.create("default", &web("")).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AlreadyExists { .. }));

        // Namespaces are independent.
        assert!(registry.create("staging", &web("10.1.1.1")).await.is_ok());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let registry = MemoryRegistry::new();
        registry.fail_next_creates(1);

        assert!(registry.create("default", &web("")).await.unwrap_err().is_transient());
        assert!(registry.create("default", &web("")).await.is_ok());
        assert_eq!(registry.create_calls(), 2);
    }
}
