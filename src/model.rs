//! Data model shared by the catalog and the stream pipeline.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

/// One episode (or a whole anime page) to resolve streams for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpisodeReference {
    /// URL of the hosting page.
    pub url: String,
    /// DLE `news_id`, when already known from the page.
    pub content_id: Option<String>,
    /// Episode display name inside the playlist; `None` selects every entry.
    pub episode: Option<String>,
}

impl EpisodeReference {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content_id: None,
            episode: None,
        }
    }

    #[must_use]
    pub fn with_episode(mut self, episode: impl Into<String>) -> Self {
        self.episode = Some(episode.into());
        self
    }

    #[must_use]
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        self.content_id = Some(content_id.into());
        self
    }
}

/// One playlist row: an unresolved stream reference and its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaylistEntry {
    /// The entry's own display text (e.g. `"1 серія"`).
    pub episode: String,
    /// Composite label built from the playlist tabs (dubbing team, player).
    pub label: String,
    /// Absolute URL from `data-file`: an embed page, manifest or media file.
    pub raw_reference: String,
}

/// Classification of a raw stream reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceKind {
    /// Playable file (`.mp4`, `.webm`, `.mkv`), emitted as is.
    DirectMedia { url: String },
    /// HLS playlist, expanded into one descriptor per variant.
    HlsManifest { url: String },
    /// Player page to scrape for manifests, iframes and MP4 literals.
    Embed { url: String },
}

const MEDIA_EXTENSIONS: &[&str] = &[".mp4", ".webm", ".mkv"];

impl ReferenceKind {
    /// Classify by URL shape. Anything that is not obviously media is an
    /// embed page to be scraped.
    pub fn classify(url: &str) -> Self {
        let url = url.to_string();
        if url.contains(".m3u8") {
            return Self::HlsManifest { url };
        }
        let path = url
            .split(['?', '#'])
            .next()
            .unwrap_or(url.as_str())
            .to_ascii_lowercase();
        if MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            Self::DirectMedia { url }
        } else {
            Self::Embed { url }
        }
    }

    /// The classified URL.
    pub fn url(&self) -> &str {
        match self {
            Self::DirectMedia { url } | Self::HlsManifest { url } | Self::Embed { url } => url,
        }
    }
}

/// One rendition listed by an HLS manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVariant {
    /// `"1080p"` style label, or `"Default"`.
    pub quality: String,
    pub media_url: String,
}

/// A playable stream handed back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    /// Manifest variant or media file URL.
    pub url: String,
    /// Human-readable label, e.g. `"TeamA | ПЛЕЄР ASHDI | 1080p"`.
    pub label: String,
    /// Headers the player must send; always contains `Referer`.
    pub required_headers: BTreeMap<String, String>,
}

impl StreamDescriptor {
    /// Descriptor whose only required header is `Referer: referer`.
    pub fn new(url: impl Into<String>, label: impl Into<String>, referer: &str) -> Self {
        let mut required_headers = BTreeMap::new();
        required_headers.insert("Referer".to_string(), referer.to_string());
        Self {
            url: url.into(),
            label: label.into(),
            required_headers,
        }
    }

    /// The `Referer` the player must send.
    pub fn referer(&self) -> Option<&str> {
        self.required_headers.get("Referer").map(String::as_str)
    }
}

/// Keep the first descriptor for every distinct URL, preserving order.
pub fn dedup_by_url(descriptors: Vec<StreamDescriptor>) -> Vec<StreamDescriptor> {
    let mut seen = HashSet::new();
    descriptors
        .into_iter()
        .filter(|d| seen.insert(d.url.clone()))
        .collect()
}

/// Catalog listing card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnimeItem {
    pub title: String,
    pub url: String,
    pub poster_url: Option<String>,
}

/// One page of catalog results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnimePage {
    pub items: Vec<AnimeItem>,
    pub has_next_page: bool,
}

/// Detail page metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnimeDetails {
    pub title: String,
    pub poster_url: Option<String>,
    pub description: Option<String>,
    pub genres: Vec<String>,
}
