//! Episode playlist locator.
//!
//! The hosting page names its playlist through a `.playlists-ajax`
//! container (`data-news_id`, `data-xfname`); the entries themselves are
//! served by `engine/ajax/playlists.php`. When the side channel fails the
//! page's own markup is scanned instead.

use std::sync::LazyLock;

use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use super::playlist::{finalize, parse_inline_player, parse_playlist};
use crate::config::SourceConfig;
use crate::error::{Result, SourceError};
use crate::http_client::SiteClient;
use crate::model::{EpisodeReference, PlaylistEntry};

const AJAX_PATH: &str = "/engine/ajax/playlists.php";

static AJAX_CONTAINER: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".playlists-ajax, [data-news_id]").unwrap());

/// Identifies one playlist on the AJAX endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistTarget {
    pub news_id: String,
    pub xfield: String,
}

impl PlaylistTarget {
    /// Find the playlist id on the page, then on the reference, then in the
    /// page URL.
    pub fn discover(page: &str, episode: &EpisodeReference, config: &SourceConfig) -> Option<Self> {
        let document = Html::parse_document(page);
        let container = document.select(&AJAX_CONTAINER).next();
        let attr = |name: &str| {
            container
                .and_then(|c| c.value().attr(name))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let news_id = attr("data-news_id")
            .or_else(|| episode.content_id.clone())
            .or_else(|| content_id_from_url(&episode.url))?;
        let xfield = attr("data-xfname").unwrap_or_else(|| config.playlist_field.clone());

        Some(Self { news_id, xfield })
    }

    /// `playlists.php` URL for this target under the configured origin.
    pub fn ajax_url(&self, config: &SourceConfig) -> String {
        format!(
            "{}{AJAX_PATH}?news_id={}&xfield={}",
            config.origin_str(),
            urlencoding::encode(&self.news_id),
            urlencoding::encode(&self.xfield)
        )
    }
}

/// `https://anitube.in.ua/4110-title.html` → `4110`.
pub fn content_id_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some(digits)
}

#[derive(Debug, Deserialize)]
struct AjaxEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    response: String,
    #[serde(default)]
    message: Option<String>,
}

/// Accept either the JSON envelope or a bare HTML fragment.
fn unwrap_ajax_body(body: &str) -> Result<String> {
    let trimmed = body.trim_start();
    let fragment = if trimmed.starts_with('{') {
        let envelope: AjaxEnvelope = serde_json::from_str(trimmed)?;
        if !envelope.success {
            return Err(SourceError::Ajax(
                envelope.message.unwrap_or_else(|| "success=false".to_string()),
            ));
        }
        envelope.response
    } else {
        body.to_string()
    };

    if fragment.trim().is_empty() {
        return Err(SourceError::Ajax("empty playlist fragment".to_string()));
    }
    Ok(fragment)
}

/// Produces the flat list of playlist entries for an episode page.
#[derive(Clone)]
pub struct PlaylistLocator {
    client: SiteClient,
}

impl PlaylistLocator {
    pub fn new(client: SiteClient) -> Self {
        Self { client }
    }

    /// Locate entries. Only a failed page fetch is an error.
    #[instrument(skip(self, episode), fields(url = %episode.url))]
    pub async fn locate(&self, episode: &EpisodeReference) -> Result<Vec<PlaylistEntry>> {
        let config = self.client.config();
        let page = self
            .client
            .get_text(&episode.url, None)
            .await
            .map_err(|e| SourceError::EpisodePage {
                url: episode.url.clone(),
                source: Box::new(e),
            })?;

        let mut entries = match PlaylistTarget::discover(&page, episode, config) {
            Some(target) => match self.fetch_side_channel(&target, &episode.url).await {
                Ok(fragment) => parse_playlist(&fragment, config),
                Err(e) => {
                    warn!(news_id = %target.news_id, "Playlist side channel failed, using page: {}", e);
                    Vec::new()
                }
            },
            None => {
                debug!("No playlist id on page");
                Vec::new()
            }
        };

        if entries.is_empty() {
            entries = parse_playlist(&page, config);
        }
        if entries.is_empty() {
            if let Ok(page_url) = Url::parse(&episode.url) {
                entries = parse_inline_player(&page, &page_url);
            }
        }

        let entries = finalize(entries, config.reverse_playlist);
        debug!(entries = entries.len(), "Playlist located");
        Ok(entries)
    }

    async fn fetch_side_channel(&self, target: &PlaylistTarget, page_url: &str) -> Result<String> {
        let url = target.ajax_url(self.client.config());
        let body = self.client.get_ajax(&url, page_url).await?;
        unwrap_ajax_body(&body)
    }
}
