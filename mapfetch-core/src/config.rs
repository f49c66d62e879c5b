//! Centralized configuration for Mapfetch.
//!
//! All tunable timeouts, retry bounds and paths live here instead of being
//! scattered through the search and download code.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Mapfetch components.
#[derive(Debug, Clone, Default)]
pub struct MapfetchConfig {
    pub catalog: CatalogConfig,
    pub search: SearchConfig,
    pub download: DownloadConfig,
}

/// Remote catalog endpoint and HTTP client settings.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Base URL of the catalog API (no trailing slash)
    pub base_url: String,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
    /// Whole-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Maximum number of items requested per search page
    pub per_page: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://celab.jetfox.ovh/api/v4".to_string(),
            user_agent: "mapfetch/0.1.0",
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            per_page: 20,
        }
    }
}

/// Search barrier settings.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Wall-clock bound on a single search; partial results are returned after it
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
        }
    }
}

/// Download and extraction settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Root folder that receives one sub-folder per downloaded map
    pub destination: PathBuf,
    /// How many times to look for the extracted artifact before giving up
    pub extraction_attempts: u32,
    /// Base delay between artifact polls, multiplied by the attempt number
    pub extraction_backoff: Duration,
    /// Bound on the blocking extractor call itself
    pub extraction_timeout: Duration,
    /// File extensions that identify the playable artifact inside an archive
    pub artifact_extensions: Vec<String>,
    /// Whether to write `workshop_info.json` next to the artifact
    pub write_metadata: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            destination: PathBuf::from("workshop"),
            extraction_attempts: 10,
            extraction_backoff: Duration::from_millis(200),
            extraction_timeout: Duration::from_secs(30),
            artifact_extensions: vec!["udk".to_string(), "upk".to_string()],
            write_metadata: true,
        }
    }
}

impl MapfetchConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = std::env::var("MAPFETCH_BASE_URL") {
            config.catalog.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(per_page) = std::env::var("MAPFETCH_PER_PAGE")
            && let Ok(count) = per_page.parse::<usize>()
        {
            config.catalog.per_page = count;
        }

        if let Ok(timeout) = std::env::var("MAPFETCH_SEARCH_TIMEOUT")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.search.timeout = Duration::from_secs(seconds);
        }

        if let Ok(destination) = std::env::var("MAPFETCH_DESTINATION") {
            config.download.destination = PathBuf::from(destination);
        }

        if let Ok(attempts) = std::env::var("MAPFETCH_EXTRACTION_ATTEMPTS")
            && let Ok(count) = attempts.parse::<u32>()
        {
            config.download.extraction_attempts = count;
        }

        config
    }

    /// Creates a configuration with short bounds for tests.
    pub fn for_testing() -> Self {
        Self {
            catalog: CatalogConfig {
                base_url: "http://catalog.test/api/v4".to_string(),
                ..Default::default()
            },
            search: SearchConfig {
                timeout: Duration::from_secs(2),
            },
            download: DownloadConfig {
                extraction_attempts: 3,
                extraction_backoff: Duration::from_millis(10),
                extraction_timeout: Duration::from_secs(2),
                ..Default::default()
            },
        }
    }
}
