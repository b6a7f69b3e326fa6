//! `anitube-source` - content adapter for anitube.in.ua
//!
//! # Features
//!
//! - **Catalog**: listing, search, detail pages and episode lists
//! - **Playlist location**: DLE `playlists.php` side channel with page fallback
//! - **Stream resolution**: bounded traversal of player iframes down to
//!   HLS manifests or MP4 files
//! - **Manifest expansion**: one descriptor per quality variant
//!
//! # Example
//!
//! ```rust,no_run
//! use anitube_source::{AnimeSource, AnitubeSource, SourceConfig};
//!
//! #[tokio::main]
//! async fn main() -> anitube_source::Result<()> {
//!     let source = AnitubeSource::new(SourceConfig::default())?;
//!     let episodes = source
//!         .list_episodes("https://anitube.in.ua/4110-frieren.html")
//!         .await?;
//!     if let Some(first) = episodes.first() {
//!         for stream in source.get_streams(first).await? {
//!             println!("{} {}", stream.label, stream.url);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod http_client;
pub mod model;
pub mod source;
pub mod stream;

pub use config::SourceConfig;
pub use error::{Result, SourceError};
pub use http_client::SiteClient;
pub use model::{
    AnimeDetails, AnimeItem, AnimePage, EpisodeReference, ManifestVariant, PlaylistEntry,
    ReferenceKind, StreamDescriptor,
};
pub use source::{AnimeSource, AnitubeSource};
pub use stream::{ManifestExpander, PlaylistLocator, StreamPipeline, StreamResolver};

/// Version of anitube-source
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
