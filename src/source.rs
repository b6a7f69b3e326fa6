//! Host-facing source trait and the anitube implementation.
//!
//! A host application drives a source through [`AnimeSource`]: browse and
//! search the catalog, open a detail page, list its episodes, then ask for
//! playable streams of one episode.

use async_trait::async_trait;

use crate::catalog::Catalog;
use crate::config::SourceConfig;
use crate::error::Result;
use crate::http_client::SiteClient;
use crate::model::{AnimeDetails, AnimePage, EpisodeReference, StreamDescriptor};
use crate::stream::StreamPipeline;

/// Trait for site adapters.
#[async_trait]
pub trait AnimeSource: Send + Sync {
    /// Short lowercase source name.
    fn name(&self) -> &'static str;

    /// Site origin.
    fn base_url(&self) -> &str;

    /// Returns `true` if this source can handle the given URL.
    fn matches(&self, url: &str) -> bool;

    /// Catalog listing, 1-based pages.
    async fn list_popular(&self, page: u32) -> Result<AnimePage>;

    /// Full-text search, 1-based pages.
    async fn search(&self, query: &str, page: u32) -> Result<AnimePage>;

    /// Metadata from a detail page.
    async fn fetch_details(&self, url: &str) -> Result<AnimeDetails>;

    /// Episodes of the anime at `url`.
    async fn list_episodes(&self, url: &str) -> Result<Vec<EpisodeReference>>;

    /// Playable streams for one episode, unique by URL.
    async fn get_streams(&self, episode: &EpisodeReference) -> Result<Vec<StreamDescriptor>>;
}

/// Adapter for anitube.in.ua.
#[derive(Clone)]
pub struct AnitubeSource {
    client: SiteClient,
    catalog: Catalog,
    pipeline: StreamPipeline,
}

impl AnitubeSource {
    /// Build a source for `config`; fails on invalid settings.
    pub fn new(config: SourceConfig) -> Result<Self> {
        let client = SiteClient::new(config)?;
        Ok(Self {
            catalog: Catalog::new(client.clone()),
            pipeline: StreamPipeline::new(client.clone()),
            client,
        })
    }

    pub fn config(&self) -> &SourceConfig {
        self.client.config()
    }

    /// The stream pipeline behind `get_streams`.
    pub fn pipeline(&self) -> &StreamPipeline {
        &self.pipeline
    }
}

#[async_trait]
impl AnimeSource for AnitubeSource {
    fn name(&self) -> &'static str {
        "anitube"
    }

    fn base_url(&self) -> &str {
        self.config().origin_str()
    }

    fn matches(&self, url: &str) -> bool {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .is_some_and(|host| {
                self.config()
                    .origin
                    .host_str()
                    .is_some_and(|origin| host == origin || host.ends_with(&format!(".{origin}")))
            })
    }

    async fn list_popular(&self, page: u32) -> Result<AnimePage> {
        self.catalog.list_popular(page).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<AnimePage> {
        self.catalog.search(query, page).await
    }

    async fn fetch_details(&self, url: &str) -> Result<AnimeDetails> {
        self.catalog.fetch_details(url).await
    }

    async fn list_episodes(&self, url: &str) -> Result<Vec<EpisodeReference>> {
        self.catalog.list_episodes(url).await
    }

    async fn get_streams(&self, episode: &EpisodeReference) -> Result<Vec<StreamDescriptor>> {
        self.pipeline.get_streams(episode).await
    }
}
