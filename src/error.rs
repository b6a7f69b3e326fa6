//! Error taxonomy for the adapter.
//!
//! Only [`SourceError::EpisodePage`] is meant to reach the host from the
//! stream pipeline; every other failure inside the pipeline is recovered
//! locally and logged.

use thiserror::Error;

/// Adapter errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("invalid URL {url:?}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("playlist endpoint rejected request: {0}")]
    Ajax(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The episode's hosting page could not be fetched; no playlist can be
    /// located without it.
    #[error("failed to fetch episode page {url}: {source}")]
    EpisodePage {
        url: String,
        #[source]
        source: Box<SourceError>,
    },
}

impl SourceError {
    pub(crate) fn url(url: &str, source: url::ParseError) -> Self {
        Self::Url {
            url: url.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
