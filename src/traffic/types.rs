//! Document shapes stored in the service and traffic collections.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Health classification attached to an observed flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum TrafficStatus {
    /// Flow is healthy.
    #[serde(rename = "OK")]
    #[strum(serialize = "OK")]
    Ok,
    /// Flow shows degradation.
    Warning,
    /// Flow is failing.
    Critical,
}

/// Service metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Service name, the lookup key.
    pub name: String,
    /// Address the service listens on.
    pub ip_address: String,
    /// Listening port; absent or non-integer values read as `None`.
    #[serde(default, deserialize_with = "lenient_port")]
    pub listening_port: Option<i64>,
}

fn lenient_port<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Int(i64),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Option::<PortValue>::deserialize(deserializer)? {
        Some(PortValue::Int(port)) => Some(port),
        Some(PortValue::Other(_)) | None => None,
    })
}

/// One observed network flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRecord {
    /// Source address.
    pub source_ip: String,
    /// Source port.
    pub source_port: i64,
    /// Destination address.
    pub destination_ip: String,
    /// Destination port.
    pub destination_port: i64,
    /// Flow status.
    pub status: TrafficStatus,
}

impl TrafficRecord {
    /// Whether either endpoint of the flow is `ip`.
    pub fn touches(&self, ip: &str) -> bool {
        self.source_ip == ip || self.destination_ip == ip
    }
}

/// Traffic record joined with its companion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedTrafficRecord {
    /// Source address.
    pub source_ip: String,
    /// Source port.
    pub source_port: i64,
    /// Destination address.
    pub destination_ip: String,
    /// Destination port.
    pub destination_port: i64,
    /// Flow status.
    pub status: TrafficStatus,
    /// Companion service name.
    pub service_name: String,
    /// Companion service address.
    pub service_ip: String,
    /// Companion service port.
    pub service_port: Option<i64>,
}

impl EnrichedTrafficRecord {
    /// Combine a flow with the service attached to it.
    pub fn new(traffic: TrafficRecord, service: &ServiceRecord) -> Self {
        Self {
            source_ip: traffic.source_ip,
            source_port: traffic.source_port,
            destination_ip: traffic.destination_ip,
            destination_port: traffic.destination_port,
            status: traffic.status,
            service_name: service.name.clone(),
            service_ip: service.ip_address.clone(),
            service_port: service.listening_port,
        }
    }
}
