//! Stream reference resolution.
//!
//! A raw playlist reference is either a manifest, a media file, or an embed
//! page (player iframe) that has to be scraped for one of the former. Embed
//! pages may nest further iframes, so resolution walks an explicit worklist:
//! every visited URL becomes a node in an arena, and the walk stops at
//! `max_embed_visits` distinct URLs or `max_embed_depth` levels.

use std::collections::HashSet;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;

use super::manifest::ManifestExpander;
use crate::http_client::SiteClient;
use crate::model::{dedup_by_url, ReferenceKind, StreamDescriptor};

/// Label for MP4 files found directly on an embed page.
pub const DIRECT_MP4_LABEL: &str = "Direct (mp4)";

static MANIFEST_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["'](https?:[^"'\s]*?\.m3u8[^"'\s]*)["']"#).unwrap()
});
static MP4_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"["'](https?:[^"'\s]*?\.mp4[^"'\s]*)["']"#).unwrap());
static IFRAME: LazyLock<Selector> = LazyLock::new(|| Selector::parse("iframe[src]").unwrap());

/// What a fetched embed page offers.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PageScan {
    pub manifests: Vec<String>,
    pub iframes: Vec<String>,
    pub mp4s: Vec<String>,
}

/// Scan an embed page body fetched from `page_url`.
pub fn scan_page(body: &str, page_url: &str) -> PageScan {
    let manifests = quoted_urls(body, &MANIFEST_LITERAL);
    let iframes = if manifests.is_empty() {
        iframe_sources(body, page_url)
    } else {
        Vec::new()
    };
    PageScan {
        manifests,
        iframes,
        mp4s: quoted_urls(body, &MP4_LITERAL),
    }
}

/// Absolute URLs inside quoted literals, with `\/` unescaped, first-seen order.
fn quoted_urls(body: &str, pattern: &Regex) -> Vec<String> {
    let mut seen = HashSet::new();
    pattern
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("\\/", "/"))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Iframe sources resolved against the page, excluding the page itself.
fn iframe_sources(body: &str, page_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let document = Html::parse_document(body);
    let mut seen = HashSet::new();
    document
        .select(&IFRAME)
        .filter_map(|el| el.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty() && !src.starts_with("about:"))
        .filter_map(|src| base.join(src).ok())
        .map(String::from)
        .filter(|src| src != page_url && seen.insert(src.clone()))
        .collect()
}

/// Outcome of visiting one node.
enum Visit {
    /// Ground streams (possibly none, when every manifest was dead).
    Streams(Vec<StreamDescriptor>),
    /// An embed page without manifests.
    Page { iframes: Vec<String>, mp4s: Vec<String> },
    /// Fetch failed; the branch yields nothing.
    Failed,
}

/// One visited URL in the embed traversal.
#[derive(Debug)]
struct EmbedNode {
    url: String,
    referer: String,
    depth: usize,
    parent: Option<usize>,
    /// MP4 literals used only if nothing below this node yields streams.
    fallback: Vec<String>,
    produced: bool,
}

/// Resolves raw references to playable descriptors.
#[derive(Clone)]
pub struct StreamResolver {
    client: SiteClient,
    expander: ManifestExpander,
}

impl StreamResolver {
    pub fn new(client: SiteClient) -> Self {
        let expander = ManifestExpander::new(client.clone());
        Self { client, expander }
    }

    /// Resolve `raw_url`, fetched with `referer_url` as `Referer`.
    ///
    /// Never fails: dead branches contribute nothing.
    #[instrument(skip(self), fields(raw = %raw_url))]
    pub async fn resolve(&self, raw_url: &str, referer_url: &str) -> Vec<StreamDescriptor> {
        let config = self.client.config();
        let mut arena = vec![EmbedNode {
            url: raw_url.to_string(),
            referer: referer_url.to_string(),
            depth: 0,
            parent: None,
            fallback: Vec::new(),
            produced: false,
        }];
        let mut visited: HashSet<String> = HashSet::from([raw_url.to_string()]);
        let mut results = Vec::new();
        let mut frontier = vec![0usize];

        while !frontier.is_empty() {
            let outcomes = join_all(
                frontier
                    .iter()
                    .map(|&idx| self.visit(&arena[idx].url, &arena[idx].referer)),
            )
            .await;

            let mut next = Vec::new();
            for (idx, outcome) in frontier.into_iter().zip(outcomes) {
                match outcome {
                    Visit::Streams(descriptors) => {
                        if !descriptors.is_empty() {
                            mark_produced(&mut arena, idx);
                            results.extend(descriptors);
                        }
                    }
                    Visit::Page { iframes, mp4s } => {
                        arena[idx].fallback = mp4s;
                        let depth = arena[idx].depth + 1;
                        let parent_url = arena[idx].url.clone();
                        for src in iframes {
                            if depth > config.max_embed_depth {
                                debug!(%src, depth, "Embed depth limit reached");
                                break;
                            }
                            if visited.len() >= config.max_embed_visits {
                                debug!(%src, "Embed visit budget exhausted");
                                break;
                            }
                            if !visited.insert(src.clone()) {
                                continue;
                            }
                            arena.push(EmbedNode {
                                url: src,
                                referer: parent_url.clone(),
                                depth,
                                parent: Some(idx),
                                fallback: Vec::new(),
                                produced: false,
                            });
                            next.push(arena.len() - 1);
                        }
                    }
                    Visit::Failed => {}
                }
            }
            frontier = next;
        }

        // Deepest nodes first so a productive child suppresses its ancestors.
        for idx in (0..arena.len()).rev() {
            if arena[idx].produced || arena[idx].fallback.is_empty() {
                continue;
            }
            let node = &arena[idx];
            results.extend(
                node.fallback
                    .iter()
                    .map(|url| StreamDescriptor::new(url.as_str(), DIRECT_MP4_LABEL, &node.url)),
            );
            mark_produced(&mut arena, idx);
        }

        debug!(visited = arena.len(), streams = results.len(), "Reference resolved");
        dedup_by_url(results)
    }

    async fn visit(&self, url: &str, referer: &str) -> Visit {
        match ReferenceKind::classify(url) {
            ReferenceKind::HlsManifest { url } => {
                Visit::Streams(self.expander.expand(&url, referer).await)
            }
            ReferenceKind::DirectMedia { url } => {
                Visit::Streams(vec![StreamDescriptor::new(url, DIRECT_MP4_LABEL, referer)])
            }
            ReferenceKind::Embed { url } => {
                let body = match self.client.get_text(&url, Some(referer)).await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!("Embed {} unavailable: {}", url, e);
                        return Visit::Failed;
                    }
                };

                let scan = scan_page(&body, &url);
                if scan.manifests.is_empty() {
                    return Visit::Page {
                        iframes: scan.iframes,
                        mp4s: scan.mp4s,
                    };
                }

                let expanded = join_all(
                    scan.manifests
                        .iter()
                        .map(|manifest| self.expander.expand(manifest, &url)),
                )
                .await;
                Visit::Streams(expanded.into_iter().flatten().collect())
            }
        }
    }
}

fn mark_produced(arena: &mut [EmbedNode], mut idx: usize) {
    loop {
        arena[idx].produced = true;
        match arena[idx].parent {
            Some(parent) => idx = parent,
            None => break,
        }
    }
}
