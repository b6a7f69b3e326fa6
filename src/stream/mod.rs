//! Video source resolution pipeline.
//!
//! [`PlaylistLocator`] → [`StreamResolver`] (per entry) → [`ManifestExpander`]
//! (per manifest) → deduplicated [`StreamDescriptor`] list.

pub mod locator;
pub mod manifest;
pub mod playlist;
pub mod resolver;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument};

pub use locator::PlaylistLocator;
pub use manifest::ManifestExpander;
pub use resolver::StreamResolver;

use crate::error::Result;
use crate::http_client::SiteClient;
use crate::model::{dedup_by_url, EpisodeReference, PlaylistEntry, StreamDescriptor};
use playlist::LABEL_SEPARATOR;

/// Resolves an episode reference to playable streams.
#[derive(Clone)]
pub struct StreamPipeline {
    client: SiteClient,
    locator: PlaylistLocator,
    resolver: StreamResolver,
}

impl StreamPipeline {
    pub fn new(client: SiteClient) -> Self {
        Self {
            locator: PlaylistLocator::new(client.clone()),
            resolver: StreamResolver::new(client.clone()),
            client,
        }
    }

    pub fn locator(&self) -> &PlaylistLocator {
        &self.locator
    }

    /// All playable streams for `episode`, unique by URL.
    ///
    /// Fails only when the episode page itself cannot be fetched; an episode
    /// without any resolvable stream yields an empty list.
    #[instrument(skip(self, episode), fields(url = %episode.url, episode = ?episode.episode))]
    pub async fn get_streams(&self, episode: &EpisodeReference) -> Result<Vec<StreamDescriptor>> {
        let entries: Vec<PlaylistEntry> = self
            .locator
            .locate(episode)
            .await?
            .into_iter()
            .filter(|e| episode.episode.as_ref().map_or(true, |name| &e.episode == name))
            .collect();
        debug!(entries = entries.len(), "Resolving playlist entries");

        let page_url = episode.url.as_str();
        let resolved: Vec<Vec<StreamDescriptor>> = stream::iter(entries)
            .map(|entry| async move {
                self.resolver
                    .resolve(&entry.raw_reference, page_url)
                    .await
                    .into_iter()
                    .map(|d| StreamDescriptor {
                        label: format!("{}{LABEL_SEPARATOR}{}", entry.label, d.label),
                        ..d
                    })
                    .collect::<Vec<_>>()
            })
            .buffered(self.client.config().concurrency)
            .collect()
            .await;

        let streams = dedup_by_url(resolved.into_iter().flatten().collect());
        info!(streams = streams.len(), "Streams resolved");
        Ok(streams)
    }
}
