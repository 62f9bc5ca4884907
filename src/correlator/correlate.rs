//! Traffic correlation: flows touching a service, joined with service info.

use std::collections::HashSet;

use mongodb::bson::{doc, from_document, Document};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::error::CorrelateError;
use crate::metrics;
use crate::store::DocumentStore;
use crate::traffic::{EnrichedTrafficRecord, ServiceRecord, TrafficRecord};

use super::resolver::resolve_service;

/// Filter selecting flows where `ip` is either endpoint.
pub fn traffic_filter(ip: &str) -> Document {
    doc! {
        "$or": [
            { "source_ip": ip },
            { "destination_ip": ip },
        ]
    }
}

/// Filter selecting services listening on any of `ips`.
pub fn companion_filter(ips: &[&str]) -> Document {
    doc! { "ip_address": { "$in": ips.to_vec() } }
}

/// Find every flow touching `service_name`'s IP, enriched with service info.
///
/// Each row carries its companion service: the first service record whose IP
/// equals either endpoint. That is usually, but not necessarily, the resolved
/// service, which is also the fallback when the companion lookup finds
/// nothing. Rows come back in store order.
#[instrument(skip(store))]
pub async fn correlate(
    store: &dyn DocumentStore,
    database: &str,
    service_collection: &str,
    network_collection: &str,
    service_name: &str,
) -> Result<Vec<EnrichedTrafficRecord>, CorrelateError> {
    let service = resolve_service(store, database, service_collection, service_name).await?;
    let service_ip = service.ip_address.as_str();

    let traffic_documents = store
        .find(database, network_collection, traffic_filter(service_ip))
        .await
        .map_err(CorrelateError::QueryFailed)?;

    let traffic: Vec<TrafficRecord> = decode_all::<TrafficRecord>(traffic_documents, "traffic")
        .into_iter()
        .filter(|record| record.touches(service_ip))
        .collect();

    if traffic.is_empty() {
        info!(%service_ip, "No traffic for service");
        return Ok(Vec::new());
    }

    let companions = load_companions(store, database, service_collection, &traffic).await?;

    // Every row touches the resolved service, so it always qualifies.
    let enriched: Vec<EnrichedTrafficRecord> = traffic
        .into_iter()
        .map(|record| {
            let companion = companions
                .iter()
                .find(|candidate| record.touches(&candidate.ip_address))
                .unwrap_or(&service);
            EnrichedTrafficRecord::new(record, companion)
        })
        .collect();

    info!(%service_ip, count = enriched.len(), "Correlated traffic");
    Ok(enriched)
}

/// Fetch services listening on any endpoint IP of `traffic`.
async fn load_companions(
    store: &dyn DocumentStore,
    database: &str,
    service_collection: &str,
    traffic: &[TrafficRecord],
) -> Result<Vec<ServiceRecord>, CorrelateError> {
    let mut seen = HashSet::new();
    let ips: Vec<&str> = traffic
        .iter()
        .flat_map(|record| [record.source_ip.as_str(), record.destination_ip.as_str()])
        .filter(|ip| seen.insert(*ip))
        .collect();

    let documents = store
        .find(database, service_collection, companion_filter(&ips))
        .await
        .map_err(CorrelateError::QueryFailed)?;

    debug!(candidates = ips.len(), found = documents.len(), "Loaded companion services");
    Ok(decode_all(documents, "service"))
}

/// Decode documents, logging and dropping the ones that do not fit `T`.
fn decode_all<T: DeserializeOwned>(documents: Vec<Document>, kind: &'static str) -> Vec<T> {
    documents
        .into_iter()
        .filter_map(|document| match from_document::<T>(document) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(kind, error = %e, "Failed to decode document, skipping");
                metrics::inc_records_skipped(kind);
                None
            }
        })
        .collect()
}
