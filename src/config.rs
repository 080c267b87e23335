//! Configuration management for ledgerlimit.
//!
//! Settings come from an optional YAML file, overridden by environment
//! variables of the form `LEDGERLIMIT__SECTION__KEY`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ratelimit::{QuotaTable, DEFAULT_BATCH_SIZE, DEFAULT_RETENTION_MS};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "LEDGERLIMIT";

/// Main configuration for the service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerLimitConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Credential configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Ledger storage configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Retention sweep configuration
    #[serde(default)]
    pub sweep: SweepConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Quota table override; the standard table when absent
    #[serde(default)]
    pub quotas: Option<QuotaTable>,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// gRPC server address
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
        }
    }
}

fn default_grpc_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8081))
}

/// Credential configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret; every caller is anonymous without one
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Token issuer
    #[serde(default = "default_issuer")]
    pub issuer: String,

    /// Lifetime of minted tokens in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("issuer", &self.issuer)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            issuer: default_issuer(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

fn default_issuer() -> String {
    "ledgerlimit".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

/// Which ledger implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Records are kept in process memory
    #[default]
    Memory,
    /// Records are journaled to `ledger.path`
    Journal,
}

/// Ledger storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: LedgerBackend,

    /// Journal file, required by the journal backend
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Tombstoned records tolerated before the journal is rewritten
    #[serde(default = "default_compact_after")]
    pub compact_after: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::default(),
            path: None,
            compact_after: default_compact_after(),
        }
    }
}

fn default_compact_after() -> usize {
    1000
}

/// Retention sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweep cycles
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// Records older than this many milliseconds are deleted
    #[serde(default = "default_retention_ms")]
    pub retention_ms: u64,

    /// Most records deleted per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
            retention_ms: default_retention_ms(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_retention_ms() -> u64 {
    DEFAULT_RETENTION_MS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl LedgerLimitConfig {
    /// Load configuration from an optional YAML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: LedgerLimitConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, ignoring the environment.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: LedgerLimitConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The quota table in force.
    pub fn quota_table(&self) -> QuotaTable {
        self.quotas.clone().unwrap_or_else(QuotaTable::standard)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let quotas = self.quota_table();
        quotas.validate()?;

        let largest = quotas.largest_window_ms();
        if self.sweep.retention_ms < largest {
            return Err(Error::Config(format!(
                "sweep.retention_ms ({}) is shorter than the largest quota window ({})",
                self.sweep.retention_ms, largest
            )));
        }
        if self.sweep.batch_size == 0 {
            return Err(Error::Config("sweep.batch_size must be positive".to_string()));
        }
        if self.sweep.interval_secs == 0 {
            return Err(Error::Config("sweep.interval_secs must be positive".to_string()));
        }
        if self.ledger.backend == LedgerBackend::Journal && self.ledger.path.is_none() {
            return Err(Error::Config(
                "ledger.path is required by the journal backend".to_string(),
            ));
        }
        Ok(())
    }
}
