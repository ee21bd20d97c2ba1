//! Configuration for the ledger

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Balance guard configuration
    pub guard: GuardConfig,

    /// Posting policy
    pub posting: PostingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/bank"),
            service_name: "bank-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            rocksdb: RocksDbConfig::default(),
            guard: GuardConfig::default(),
            posting: PostingConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Target file size (MB)
    pub target_file_size_mb: u64,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            target_file_size_mb: 64,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Balance guard configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// How long an operation waits for a contended balance before failing
    /// with `Busy` (milliseconds)
    pub acquire_timeout_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 2_000,
        }
    }
}

/// Posting policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostingConfig {
    /// When true, re-submitting a request whose reference number already
    /// belongs to a recorded transaction returns that record instead of
    /// failing with a conflict
    pub idempotent_replay: bool,

    /// When true, transfers between two ledger accounts require both
    /// accounts to belong to the same customer
    pub require_same_owner_transfers: bool,
}

impl Default for PostingConfig {
    fn default() -> Self {
        Self {
            idempotent_replay: false,
            require_same_owner_transfers: true,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("BANK_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("BANK_GUARD_TIMEOUT_MS") {
            config.guard.acquire_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("BANK_GUARD_TIMEOUT_MS: {}", e)))?;
        }

        if let Ok(replay) = std::env::var("BANK_IDEMPOTENT_REPLAY") {
            config.posting.idempotent_replay = replay == "1" || replay.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
