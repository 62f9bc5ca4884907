//! Traffic correlation against the document store.
//!
//! This module handles:
//! - Resolving a service name to its IP
//! - Finding traffic that touches that IP and attaching service info

pub mod correlate;
pub mod resolver;

use std::sync::Arc;

use crate::error::{CorrelateError, ResolveError};
use crate::metrics;
use crate::store::DocumentStore;
use crate::traffic::EnrichedTrafficRecord;

pub use correlate::correlate;
pub use resolver::{resolve_service, resolve_service_ip};

/// Correlator bound to a store and the collection holding service records.
#[derive(Clone)]
pub struct Correlator {
    store: Arc<dyn DocumentStore>,
    service_collection: String,
}

impl Correlator {
    /// Create a correlator over `store`.
    pub fn new(store: Arc<dyn DocumentStore>, service_collection: impl Into<String>) -> Self {
        Self {
            store,
            service_collection: service_collection.into(),
        }
    }

    /// Underlying store.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Collection holding service records.
    pub fn service_collection(&self) -> &str {
        &self.service_collection
    }

    /// Resolve a service name to its IP in `database`.
    pub async fn service_ip(&self, database: &str, service_name: &str) -> Result<String, ResolveError> {
        resolve_service_ip(
            self.store.as_ref(),
            database,
            &self.service_collection,
            service_name,
        )
        .await
    }

    /// Traffic in `network_collection` touching `service_name`, with metrics.
    pub async fn traffic_for_service(
        &self,
        database: &str,
        network_collection: &str,
        service_name: &str,
    ) -> Result<Vec<EnrichedTrafficRecord>, CorrelateError> {
        let _timer = metrics::timer_correlate();
        metrics::inc_correlate_requests();

        let result = correlate(
            self.store.as_ref(),
            database,
            &self.service_collection,
            network_collection,
            service_name,
        )
        .await;

        match &result {
            Ok(rows) => metrics::add_records_returned(rows.len()),
            Err(_) => metrics::inc_correlate_failures(),
        }

        result
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("service_collection", &self.service_collection)
            .finish_non_exhaustive()
    }
}
