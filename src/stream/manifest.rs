//! HLS manifest expansion.
//!
//! A master playlist becomes one descriptor per `#EXT-X-STREAM-INF` variant,
//! a media playlist becomes a single `Default` descriptor for the manifest
//! itself. Anything else is not a manifest and yields nothing.

use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::Result;
use crate::http_client::SiteClient;
use crate::model::{ManifestVariant, StreamDescriptor};

const STREAM_INF: &str = "#EXT-X-STREAM-INF";
const MEDIA_SEGMENT: &str = "#EXTINF";
const PLAYLIST_HEADER: &str = "#EXTM3U";

/// Label for a variant whose resolution is unknown.
pub const DEFAULT_QUALITY: &str = "Default";

/// Fetches manifests and turns them into descriptors.
#[derive(Clone)]
pub struct ManifestExpander {
    client: SiteClient,
}

impl ManifestExpander {
    pub fn new(client: SiteClient) -> Self {
        Self { client }
    }

    /// Expand one manifest. Fetch failures yield an empty list.
    #[instrument(skip(self), fields(manifest = %manifest_url))]
    pub async fn expand(&self, manifest_url: &str, referer_url: &str) -> Vec<StreamDescriptor> {
        match self.try_expand(manifest_url, referer_url).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!("Manifest {} unavailable: {}", manifest_url, e);
                Vec::new()
            }
        }
    }

    async fn try_expand(
        &self,
        manifest_url: &str,
        referer_url: &str,
    ) -> Result<Vec<StreamDescriptor>> {
        let body = self.client.get_text(manifest_url, Some(referer_url)).await?;
        let variants = parse_manifest(&body, manifest_url);
        debug!(variants = variants.len(), "Manifest parsed");

        Ok(variants
            .into_iter()
            .map(|v| StreamDescriptor::new(v.media_url, v.quality, referer_url))
            .collect())
    }
}

/// Parse a manifest body fetched from `manifest_url`.
pub fn parse_manifest(body: &str, manifest_url: &str) -> Vec<ManifestVariant> {
    if body.contains(STREAM_INF) {
        let base = Url::parse(manifest_url).ok();
        return body
            .split(STREAM_INF)
            .skip(1)
            .filter_map(|segment| parse_variant(segment, base.as_ref()))
            .collect();
    }

    if body.contains(MEDIA_SEGMENT) || body.contains(PLAYLIST_HEADER) {
        return vec![ManifestVariant {
            quality: DEFAULT_QUALITY.to_string(),
            media_url: manifest_url.to_string(),
        }];
    }

    Vec::new()
}

/// `segment` starts right after the tag: attribute list, then the URI line.
fn parse_variant(segment: &str, base: Option<&Url>) -> Option<ManifestVariant> {
    let mut lines = segment.lines();
    let attributes = lines.next().unwrap_or_default();
    let uri = lines
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))?;

    let quality = resolution_height(attributes)
        .map_or_else(|| DEFAULT_QUALITY.to_string(), |h| format!("{h}p"));

    Some(ManifestVariant {
        quality,
        media_url: resolve_uri(base, uri),
    })
}

/// Height component of `RESOLUTION=WxH`.
fn resolution_height(attributes: &str) -> Option<u32> {
    let (_, rest) = attributes.split_once("RESOLUTION=")?;
    let resolution = rest.split(',').next()?;
    let (_, height) = resolution.split_once('x')?;
    height.trim().trim_matches('"').parse().ok()
}

fn resolve_uri(base: Option<&Url>, uri: &str) -> String {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        return uri.to_string();
    }
    base.and_then(|b| b.join(uri).ok())
        .map_or_else(|| uri.to_string(), String::from)
}
