//! Application configuration loaded from environment variables.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Document Store ===
    /// MongoDB connection string.
    pub mongo_uri: String,

    /// Collection holding service records (name, ip_address, listening_port).
    #[serde(default = "default_service_collection")]
    pub service_collection: String,

    /// Database where created orchestrator services are recorded.
    #[serde(default = "default_record_database")]
    pub service_record_database: String,

    /// Collection where created orchestrator services are recorded.
    #[serde(default = "default_record_collection")]
    pub service_record_collection: String,

    /// Upper bound for connecting and for every store query, in seconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_secs: u64,

    // === Server Configuration ===
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Comma separated list of origins allowed by CORS.
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: String,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

/// Connection settings handed to the store at startup.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// MongoDB connection string.
    pub uri: String,
    /// Bound applied to connect, ping and each query.
    pub timeout: Duration,
}

impl StoreConfig {
    /// Create a store config with the default timeout.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            timeout: Duration::from_secs(default_store_timeout()),
        }
    }
}

fn default_service_collection() -> String {
    "testcollectionA".to_string()
}

fn default_record_database() -> String {
    "testdb".to_string()
}

fn default_record_collection() -> String {
    "testcollection".to_string()
}

fn default_store_timeout() -> u64 {
    10
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.mongo_uri.is_empty() {
            return Err("MONGO_URI is required".to_string());
        }

        if !self.mongo_uri.starts_with("mongodb://") && !self.mongo_uri.starts_with("mongodb+srv://")
        {
            return Err("MONGO_URI must start with mongodb:// or mongodb+srv://".to_string());
        }

        if self.store_timeout_secs == 0 {
            return Err("STORE_TIMEOUT_SECS must be greater than 0".to_string());
        }

        if self.service_collection.is_empty() {
            return Err("SERVICE_COLLECTION must not be empty".to_string());
        }

        if self.allowed_origins().is_empty() {
            return Err("CORS_ALLOWED_ORIGINS must list at least one origin".to_string());
        }

        Ok(())
    }

    /// Settings for connecting the document store.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            uri: self.mongo_uri.clone(),
            timeout: Duration::from_secs(self.store_timeout_secs),
        }
    }

    /// CORS origins split on commas, blanks removed.
    pub fn allowed_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect()
    }
}
