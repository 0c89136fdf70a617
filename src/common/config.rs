use thiserror::Error;

use super::types::{PageId, TxnId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;

/// Default number of transaction detail records the region can hold
pub const DEFAULT_MAX_TXNS: usize = 128;

/// Tree level of leaf pages
pub const LEAF_LEVEL: u8 = 0;

/// Lowest transaction id; locker ids below it belong to plain cursors
pub const TXN_MINIMUM: TxnId = TxnId(0x8000_0000);

/// Never handed out; reaching it means the id space is exhausted
pub const TXN_INVALID: TxnId = TxnId(u32::MAX);

/// Bytes buffered by the log before they are written out unforced
pub const LOG_BUFFER_SIZE: usize = 32 * 1024;

/// Error returned when loading configuration fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Runtime configuration of an environment, fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvConfig {
    /// Write log records for page changes and transaction outcomes.
    pub logging: bool,
    /// Commit without forcing the log unless a transaction asks for sync.
    pub txn_nosync: bool,
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// K for the LRU-K replacer.
    pub replacer_k: usize,
    /// Capacity of the transaction region.
    pub max_txns: usize,
    /// Report every checkpoint visited by checkpoint search.
    pub verbose_checkpoint: bool,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            logging: true,
            txn_nosync: false,
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer_k: DEFAULT_LRUK_K,
            max_txns: DEFAULT_MAX_TXNS,
            verbose_checkpoint: false,
        }
    }
}

impl EnvConfig {
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    pub fn with_txn_nosync(mut self, txn_nosync: bool) -> Self {
        self.txn_nosync = txn_nosync;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_max_txns(mut self, max_txns: usize) -> Self {
        self.max_txns = max_txns;
        self
    }

    pub fn with_verbose_checkpoint(mut self, verbose: bool) -> Self {
        self.verbose_checkpoint = verbose;
        self
    }

    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    ///
    /// - `QUIRE_POOL_SIZE`: buffer pool frames
    /// - `QUIRE_MAX_TXNS`: transaction region capacity
    /// - `QUIRE_TXN_NOSYNC`: `true`/`false`
    /// - `QUIRE_LOGGING`: `true`/`false`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = load_var("QUIRE_POOL_SIZE", parse_count)? {
            config.pool_size = value;
        }
        if let Some(value) = load_var("QUIRE_MAX_TXNS", parse_count)? {
            config.max_txns = value;
        }
        if let Some(value) = load_var("QUIRE_TXN_NOSYNC", parse_bool)? {
            config.txn_nosync = value;
        }
        if let Some(value) = load_var("QUIRE_LOGGING", parse_bool)? {
            config.logging = value;
        }
        Ok(config)
    }
}

fn load_var<T>(
    name: &str,
    parse: fn(&str) -> Result<T, String>,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) => parse(&value)
            .map(Some)
            .map_err(|message| ConfigError::InvalidValue {
                name: name.to_string(),
                message,
            }),
        Err(_) => Ok(None),
    }
}

fn parse_count(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(_) => Err(format!("'{value}' is not a number")),
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(format!("'{value}' is not a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EnvConfig::default();
        assert!(config.logging);
        assert!(!config.txn_nosync);
        assert_eq!(config.pool_size, DEFAULT_BUFFER_POOL_SIZE);
        assert_eq!(config.max_txns, DEFAULT_MAX_TXNS);
    }

    #[test]
    fn test_builders() {
        let config = EnvConfig::default()
            .with_logging(false)
            .with_pool_size(8)
            .with_max_txns(2);
        assert!(!config.logging);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.max_txns, 2);
    }

    #[test]
    fn test_parsers() {
        assert_eq!(parse_count("12"), Ok(12));
        assert!(parse_count("0").is_err());
        assert!(parse_count("many").is_err());
        assert_eq!(parse_bool("yes"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::InvalidValue {
            name: "QUIRE_POOL_SIZE".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for QUIRE_POOL_SIZE: bad value");
    }
}
