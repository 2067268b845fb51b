//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{SourceSpec, SyntaxKind};
use crate::storage::MANIFEST_FILE;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP fetching behavior
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Acceptance policy defaults
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Search index output
    #[serde(default)]
    pub index: IndexConfig,

    /// Failure forwarding
    #[serde(default)]
    pub reporting: ReportingConfig,

    /// Optional remote list catalog
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Statically registered sources
    #[serde(default = "defaults::default_sources")]
    pub sources: Vec<SourceSpec>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.fetcher.connect_timeout_secs == 0 {
            return Err(AppError::validation(
                "fetcher.connect_timeout_secs must be > 0",
            ));
        }
        if self.fetcher.run_timeout_secs == 0 {
            return Err(AppError::validation("fetcher.run_timeout_secs must be > 0"));
        }
        if self.fetcher.max_concurrent == 0 {
            return Err(AppError::validation("fetcher.max_concurrent must be > 0"));
        }
        if self.fetcher.max_attempts == 0 {
            return Err(AppError::validation("fetcher.max_attempts must be > 0"));
        }
        if self.fetcher.max_bytes == 0 {
            return Err(AppError::validation("fetcher.max_bytes must be > 0"));
        }
        if self.validation.max_line_length == 0 {
            return Err(AppError::validation(
                "validation.max_line_length must be > 0",
            ));
        }
        if self.validation.max_drop_percent > 100 {
            return Err(AppError::validation(
                "validation.max_drop_percent must be <= 100",
            ));
        }
        if self.index.filename.trim().is_empty() {
            return Err(AppError::validation("index.filename is empty"));
        }
        if !is_index_filename(&self.index.filename) {
            return Err(AppError::validation(format!(
                "index.filename '{}' must be a plain name that is not a list or the manifest",
                self.index.filename
            )));
        }
        if self.index.search_limit == 0 {
            return Err(AppError::validation("index.search_limit must be > 0"));
        }
        if self.sources.is_empty() && self.catalog.url.is_none() {
            return Err(AppError::validation(
                "No sources defined and no catalog configured",
            ));
        }
        Ok(())
    }
}

/// Whether the index can live in the output directory without
/// escaping it or replacing a published list or the manifest.
fn is_index_filename(name: &str) -> bool {
    !name.contains(['/', '\\'])
        && !name.starts_with('.')
        && !name.ends_with(".txt")
        && name != MANIFEST_FILE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fetcher: FetcherConfig::default(),
            validation: ValidationConfig::default(),
            index: IndexConfig::default(),
            reporting: ReportingConfig::default(),
            catalog: CatalogConfig::default(),
            sources: defaults::default_sources(),
        }
    }
}

/// HTTP client and fetching behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds, body included
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum concurrent fetches
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Attempts per source, first try included
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Multiplier applied to the delay after every retry
    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Response size cap in bytes
    #[serde(default = "defaults::max_bytes")]
    pub max_bytes: u64,

    /// Deadline for the whole fetch stage in seconds
    #[serde(default = "defaults::run_timeout")]
    pub run_timeout_secs: u64,

    /// Send If-None-Match / If-Modified-Since when possible
    #[serde(default = "defaults::enabled")]
    pub conditional_requests: bool,

    /// Permit plain `http://` URLs
    #[serde(default)]
    pub allow_http: bool,

    /// Permit loopback and private IP literals
    #[serde(default)]
    pub allow_private_addresses: bool,

    /// Hosts that must never be contacted
    #[serde(default = "defaults::blocked_hosts")]
    pub blocked_hosts: Vec<String>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            connect_timeout_secs: defaults::connect_timeout(),
            max_concurrent: defaults::max_concurrent(),
            max_attempts: defaults::max_attempts(),
            retry_delay_ms: defaults::retry_delay(),
            backoff_multiplier: defaults::backoff_multiplier(),
            max_bytes: defaults::max_bytes(),
            run_timeout_secs: defaults::run_timeout(),
            conditional_requests: true,
            allow_http: false,
            allow_private_addresses: false,
            blocked_hosts: defaults::blocked_hosts(),
        }
    }
}

/// Acceptance policy defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Threshold applied to sources that do not set `min_rules`
    #[serde(default = "defaults::default_min_rules")]
    pub default_min_rules: usize,

    /// Longest accepted line in bytes
    #[serde(default = "defaults::max_line_length")]
    pub max_line_length: usize,

    /// Largest tolerated rule count drop against the previous run (0-100)
    #[serde(default = "defaults::max_drop_percent")]
    pub max_drop_percent: u8,

    /// Previous rule counts below this skip the drop check
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            default_min_rules: defaults::default_min_rules(),
            max_line_length: defaults::max_line_length(),
            max_drop_percent: defaults::max_drop_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// Search index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Database filename, relative to the output directory
    #[serde(default = "defaults::index_filename")]
    pub filename: String,

    /// SQLite page size
    #[serde(default = "defaults::page_size")]
    pub page_size: u32,

    /// FTS5 `pgsz` option
    #[serde(default = "defaults::fts_page_size")]
    pub fts_page_size: u32,

    /// Default number of search results
    #[serde(default = "defaults::search_limit")]
    pub search_limit: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filename: defaults::index_filename(),
            page_size: defaults::page_size(),
            fts_page_size: defaults::fts_page_size(),
            search_limit: defaults::search_limit(),
        }
    }
}

/// Error tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Endpoint receiving JSON failure events
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "defaults::reporting_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: defaults::reporting_timeout(),
        }
    }
}

/// Remote list catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CatalogConfig {
    /// Catalog JSON URL
    #[serde(default)]
    pub url: Option<String>,
}

mod defaults {
    use super::{SourceSpec, SyntaxKind};

    pub fn enabled() -> bool {
        true
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; listmirror/0.1)".into()
    }
    pub fn timeout() -> u64 {
        300
    }
    pub fn connect_timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        2000
    }
    pub fn backoff_multiplier() -> u32 {
        2
    }
    pub fn max_bytes() -> u64 {
        50 * 1024 * 1024
    }
    pub fn run_timeout() -> u64 {
        1800
    }
    pub fn blocked_hosts() -> Vec<String> {
        vec![
            "localhost".into(),
            "127.0.0.1".into(),
            "::1".into(),
            "0.0.0.0".into(),
            "169.254.169.254".into(),
        ]
    }

    // Validation defaults
    pub fn default_min_rules() -> usize {
        1
    }
    pub fn max_line_length() -> usize {
        64 * 1024
    }
    pub fn max_drop_percent() -> u8 {
        90
    }
    pub fn min_baseline() -> usize {
        100
    }

    // Index defaults
    pub fn index_filename() -> String {
        "rules.db".into()
    }
    pub fn page_size() -> u32 {
        32768
    }
    pub fn fts_page_size() -> u32 {
        32000
    }
    pub fn search_limit() -> usize {
        50
    }

    pub fn reporting_timeout() -> u64 {
        10
    }

    // Registry defaults
    pub fn default_sources() -> Vec<SourceSpec> {
        vec![
            SourceSpec::new(
                "easylist",
                "https://easylist.to/easylist/easylist.txt",
                "easylist.txt",
                SyntaxKind::Adblock,
            )
            .with_min_rules(1000),
            SourceSpec::new(
                "easyprivacy",
                "https://easylist.to/easylist/easyprivacy.txt",
                "easyprivacy.txt",
                SyntaxKind::Adblock,
            )
            .with_min_rules(1000),
            SourceSpec::new(
                "ublock-filters",
                "https://ublockorigin.github.io/uAssets/filters/filters.txt",
                "ublock-filters.txt",
                SyntaxKind::Adblock,
            )
            .with_min_rules(1000),
            SourceSpec::new(
                "brave-unbreak",
                "https://raw.githubusercontent.com/brave/adblock-lists/master/brave-unbreak.txt",
                "brave-unbreak.txt",
                SyntaxKind::Adblock,
            )
            .with_min_rules(10),
            SourceSpec::new(
                "peter-lowe",
                "https://pgl.yoyo.org/adservers/serverlist.php?hostformat=hosts&showintro=0&mimetype=plaintext",
                "peter-lowe.txt",
                SyntaxKind::Hosts,
            )
            .with_min_rules(1000),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.fetcher.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.fetcher.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unsafe_index_filename() {
        for name in ["easylist.txt", "../rules.db", "out/rules.db", ".rules.db", "metadata.json"] {
            let mut config = Config::default();
            config.index.filename = name.to_string();
            assert!(config.validate().is_err(), "{name} accepted");
        }

        let mut config = Config::default();
        config.index.filename = "search.sqlite".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_drop_percent_over_100() {
        let mut config = Config::default();
        config.validation.max_drop_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_some_source() {
        let mut config = Config::default();
        config.sources.clear();
        assert!(config.validate().is_err());

        config.catalog.url = Some("https://example.com/catalog.json".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.fetcher.max_concurrent, 8);
        assert_eq!(config.fetcher.max_attempts, 3);
        assert_eq!(config.index.filename, "rules.db");
        assert_eq!(config.index.search_limit, 50);
        assert!(!config.sources.is_empty());
    }

    #[test]
    fn partial_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [fetcher]
            max_concurrent = 2
            allow_http = true

            [[sources]]
            name = "local"
            url = "https://lists.example.org/local.txt"
            filename = "local.txt"
            "#,
        )
        .unwrap();

        assert_eq!(config.fetcher.max_concurrent, 2);
        assert!(config.fetcher.allow_http);
        assert_eq!(config.fetcher.timeout_secs, 300);
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].syntax, SyntaxKind::Adblock);
    }
}
