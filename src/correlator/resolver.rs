//! Service name to IP resolution.

use mongodb::bson::{doc, from_document, Document};
use tracing::{debug, instrument};

use crate::error::ResolveError;
use crate::store::DocumentStore;
use crate::traffic::ServiceRecord;

/// Pipeline selecting the first service record named `service_name`.
pub fn lookup_pipeline(service_name: &str) -> Vec<Document> {
    vec![
        doc! { "$match": { "name": service_name } },
        doc! { "$limit": 1 },
    ]
}

/// Look up the service record called `service_name`.
///
/// Duplicate names resolve to whichever record the store returns first.
#[instrument(skip(store))]
pub async fn resolve_service(
    store: &dyn DocumentStore,
    database: &str,
    service_collection: &str,
    service_name: &str,
) -> Result<ServiceRecord, ResolveError> {
    let record = store
        .aggregate(database, service_collection, lookup_pipeline(service_name))
        .await
        .map_err(ResolveError::QueryFailed)?
        .into_iter()
        .next()
        .ok_or_else(|| ResolveError::NotFound(service_name.to_string()))?;

    let service: ServiceRecord = from_document(record)
        .map_err(|_| ResolveError::MalformedRecord(service_name.to_string()))?;

    debug!(ip = %service.ip_address, "Resolved service");
    Ok(service)
}

/// Look up the IP address of the service called `service_name`.
pub async fn resolve_service_ip(
    store: &dyn DocumentStore,
    database: &str,
    service_collection: &str,
    service_name: &str,
) -> Result<String, ResolveError> {
    resolve_service(store, database, service_collection, service_name)
        .await
        .map(|service| service.ip_address)
}
