//! Traffic and service record types.
//!
//! Records are produced by external collectors and only read here.

pub mod types;

pub use types::{EnrichedTrafficRecord, ServiceRecord, TrafficRecord, TrafficStatus};
