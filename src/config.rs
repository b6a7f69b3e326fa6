//! Adapter configuration.
//!
//! Everything the components need about the site (origin, header constants,
//! timeouts, embed traversal bounds) lives in [`SourceConfig`] and is handed
//! to each component at construction time.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use serde::Deserialize;
use url::Url;

use crate::error::{Result, SourceError};

/// Site origin.
pub const DEFAULT_ORIGIN: &str = "https://anitube.in.ua";

/// Fixed desktop user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Configuration for [`crate::AnitubeSource`] and its components.
///
/// Every field has a default, so a TOML file only needs the values it
/// overrides:
///
/// ```toml
/// origin = "https://anitube.in.ua"
/// timeout_secs = 15
/// max_embed_visits = 8
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Site origin every relative link is resolved against.
    pub origin: Url,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// `Accept-Language` header value.
    pub accept_language: String,
    /// Total per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Distinct URLs one reference resolution may visit.
    pub max_embed_visits: usize,
    /// Maximum iframe nesting followed from a raw reference.
    pub max_embed_depth: usize,
    /// Playlist entries resolved concurrently.
    pub concurrency: usize,
    /// The site lists newest entries first; reverse to playback order.
    pub reverse_playlist: bool,
    /// `xfield` value used when the page does not name one.
    pub playlist_field: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse(DEFAULT_ORIGIN).expect("default origin is a valid URL"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: "uk-UA,uk;q=0.9,en;q=0.8".to_string(),
            timeout_secs: 20,
            connect_timeout_secs: 10,
            max_embed_visits: 10,
            max_embed_depth: 5,
            concurrency: 4,
            reverse_playlist: true,
            playlist_field: "playlist".to_string(),
        }
    }
}

impl SourceConfig {
    /// Config pointing at a different origin (mirrors, test fixtures).
    pub fn with_origin(origin: &str) -> Result<Self> {
        let origin = Url::parse(origin).map_err(|e| SourceError::url(origin, e))?;
        Ok(Self {
            origin,
            ..Self::default()
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would stall resolution or target a non-HTTP origin.
    pub fn validate(&self) -> Result<()> {
        if self.max_embed_visits == 0 {
            return Err(SourceError::InvalidConfig(
                "max_embed_visits must be at least 1".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(SourceError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if !matches!(self.origin.scheme(), "http" | "https") {
            return Err(SourceError::InvalidConfig(format!(
                "origin must be http(s), got {}",
                self.origin
            )));
        }
        Ok(())
    }

    /// Whole-request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// TCP + TLS handshake timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Origin without the trailing slash `Url` adds, used as default referer.
    pub fn origin_str(&self) -> &str {
        self.origin.as_str().trim_end_matches('/')
    }

    /// Resolve a possibly relative link against the origin.
    pub fn absolutize(&self, link: &str) -> Result<String> {
        self.origin
            .join(link)
            .map(String::from)
            .map_err(|e| SourceError::url(link, e))
    }

    /// Headers sent with every request unless overridden per fetch.
    pub fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, header_value(&self.accept_language)?);
        headers.insert(REFERER, header_value(self.origin_str())?);
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SourceError::InvalidConfig(format!("bad header value {value:?}: {e}")))
}
