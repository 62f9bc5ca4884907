//! Network traffic correlation service.
//!
//! Given a service name, this library resolves the service's IP from a
//! document store and returns every traffic record where that IP is the
//! source or destination, joined with service metadata:
//!
//! ```text
//! services: { name: "Gaming UI", ip_address: "10.1.2.3", listening_port: 443 }
//! traffic:  { source_ip: "10.1.2.3", destination_ip: "10.9.9.9", status: "OK", ... }
//! ─────────────────────────────────────────────────────────────────────────────
//! result:   { ...traffic, service_name: "Gaming UI", service_ip: "10.1.2.3", service_port: 443 }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`traffic`]: Service and traffic record types
//! - [`store`]: Document store trait, MongoDB and in-memory stores
//! - [`correlator`]: Service IP resolution and traffic correlation
//! - [`api`]: HTTP API for correlation, health and metrics
//! - [`orchestrator`]: Kubernetes service wrappers
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod config;
pub mod correlator;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod store;
pub mod traffic;
pub mod utils;

pub use config::Config;
pub use error::{Result, ServiceError};
