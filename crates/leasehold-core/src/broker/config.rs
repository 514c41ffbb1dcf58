use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level broker configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub lease: LeaseConfig,
    pub telemetry: TelemetryConfig,
}

/// Server configuration (HTTP listen address).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

/// Storage backend selection and pool sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `sqlite::memory:`, `sqlite://path` or `postgres://…`.
    pub url: String,
    pub max_connections: u32,
    /// SQLite busy timeout; for PostgreSQL, the pool acquire timeout.
    pub busy_timeout_ms: u64,
}

/// Lease defaults and the input limits enforced before touching the store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Lease applied when a claim does not name one.
    pub default_lease_ms: u64,
    pub max_lease_ms: u64,
    pub max_claim_count: u32,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Force JSON (`true`) or pretty (`false`) output. Unset picks pretty in
    /// debug builds and JSON in release builds.
    pub json: Option<bool>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/leasehold.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            default_lease_ms: 10_000,
            max_lease_ms: 3_600_000,
            max_claim_count: 100,
            max_payload_bytes: 256 * 1024,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            json: None,
        }
    }
}

impl BrokerConfig {
    /// Reject settings that would make every request fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lease.validate()
    }
}

impl LeaseConfig {
    pub fn default_lease(&self) -> Duration {
        Duration::from_millis(self.default_lease_ms)
    }

    /// The default lease must itself pass the claim-time lease check, and
    /// every limit must admit at least one request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_lease_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "lease.max_lease_ms must be positive".to_string(),
            ));
        }
        if self.default_lease_ms == 0 || self.default_lease_ms > self.max_lease_ms {
            return Err(ConfigError::InvalidValue(format!(
                "lease.default_lease_ms must be in 1..={}, got {}",
                self.max_lease_ms, self.default_lease_ms
            )));
        }
        if self.max_claim_count == 0 {
            return Err(ConfigError::InvalidValue(
                "lease.max_claim_count must be at least 1".to_string(),
            ));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "lease.max_payload_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
