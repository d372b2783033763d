//! Service configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use common::SourceId;
use ingestion::{BackoffPolicy, PipelineConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Service configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `pretty` or `json`
/// - `DATABASE_URL`: PostgreSQL URL; unset means an in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `FEED_PATH`: NDJSON envelope file; unset means no ingestion
/// - `SOURCE_ID`: cursor key for the feed (default `"launchpad"`)
/// - `CONTRACT_ADDRESSES`: comma-separated launchpad contracts
/// - `STARTING_BLOCK`: first block for a source with no cursor
/// - `BATCH_SIZE`, `MAX_WORKERS`, `UNIT_TIMEOUT_MS`, `POLL_INTERVAL_MS`,
///   `BACKOFF_INITIAL_MS`, `BACKOFF_CEILING_MS`, `MAX_RETRIES`: pipeline tuning
///
/// Unparseable numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub feed_path: Option<PathBuf>,
    pub source_id: SourceId,
    /// Passed through to the feed operator; the pipeline does not filter on them.
    pub contract_addresses: Vec<String>,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let millis = |key: &str, default: Duration| {
            number(key).map(Duration::from_millis).unwrap_or(default)
        };

        let backoff = BackoffPolicy::new(
            millis("BACKOFF_INITIAL_MS", defaults.pipeline.backoff.initial),
            millis("BACKOFF_CEILING_MS", defaults.pipeline.backoff.ceiling),
            number("MAX_RETRIES")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.pipeline.backoff.max_retries),
        );

        let mut pipeline = PipelineConfig::new()
            .batch_size(
                number("BATCH_SIZE")
                    .map(|n| n as usize)
                    .unwrap_or(defaults.pipeline.batch_size),
            )
            .max_workers(
                number("MAX_WORKERS")
                    .map(|n| n as usize)
                    .unwrap_or(defaults.pipeline.max_workers),
            )
            .unit_timeout(millis("UNIT_TIMEOUT_MS", defaults.pipeline.unit_timeout))
            .poll_interval(millis("POLL_INTERVAL_MS", defaults.pipeline.poll_interval))
            .backoff(backoff);
        if let Some(block) = number("STARTING_BLOCK") {
            pipeline = pipeline.starting_block(block);
        }

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: number("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.database_max_connections),
            feed_path: lookup("FEED_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
            source_id: lookup("SOURCE_ID")
                .filter(|s| !s.trim().is_empty())
                .map(SourceId::new)
                .unwrap_or(defaults.source_id),
            contract_addresses: lookup("CONTRACT_ADDRESSES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|a| !a.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            pipeline,
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            feed_path: None,
            source_id: SourceId::new("launchpad"),
            contract_addresses: Vec::new(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.database_url.is_none());
        assert_eq!(config.source_id.as_str(), "launchpad");
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_empty_lookup_gives_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert!(config.feed_path.is_none());
        assert!(config.contract_addresses.is_empty());
    }

    #[test]
    fn test_reads_every_variable() {
        let config = Config::from_lookup(lookup(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8081"),
            ("RUST_LOG", "debug"),
            ("LOG_FORMAT", "JSON"),
            ("DATABASE_URL", "postgres://localhost/indexer"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("FEED_PATH", "/var/feed.ndjson"),
            ("SOURCE_ID", "base-mainnet"),
            ("CONTRACT_ADDRESSES", "0xaa, 0xbb,,"),
            ("STARTING_BLOCK", "1200"),
            ("BATCH_SIZE", "25"),
            ("MAX_WORKERS", "3"),
            ("UNIT_TIMEOUT_MS", "750"),
            ("POLL_INTERVAL_MS", "20"),
            ("BACKOFF_INITIAL_MS", "50"),
            ("BACKOFF_CEILING_MS", "800"),
            ("MAX_RETRIES", "7"),
        ]));

        assert_eq!(config.addr(), "127.0.0.1:8081");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/indexer")
        );
        assert_eq!(config.database_max_connections, 4);
        assert_eq!(config.feed_path, Some(PathBuf::from("/var/feed.ndjson")));
        assert_eq!(config.source_id.as_str(), "base-mainnet");
        assert_eq!(config.contract_addresses, vec!["0xaa", "0xbb"]);
        assert_eq!(config.pipeline.starting_block, Some(1200));
        assert_eq!(config.pipeline.batch_size, 25);
        assert_eq!(config.pipeline.max_workers, 3);
        assert_eq!(config.pipeline.unit_timeout, Duration::from_millis(750));
        assert_eq!(config.pipeline.poll_interval, Duration::from_millis(20));
        assert_eq!(
            config.pipeline.backoff,
            BackoffPolicy::new(Duration::from_millis(50), Duration::from_millis(800), 7)
        );
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("PORT", "http"),
            ("BATCH_SIZE", "-1"),
            ("DATABASE_URL", "  "),
        ]));
        assert_eq!(config.port, 3000);
        assert_eq!(config.pipeline.batch_size, 100);
        assert!(config.database_url.is_none());
    }
}
