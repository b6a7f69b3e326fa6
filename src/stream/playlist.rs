//! Playlist container parsing.
//!
//! The DLE `playlists` block is a set of tab lists followed by the video
//! list. Tabs and videos share `_`-delimited hierarchical ids:
//!
//! ```html
//! <li data-id="0_0">Озвучування</li>
//! <li data-id="0_0_1">FanVoxUA</li>
//! <li data-id="0_0_1_0">ПЛЕЄР ASHDI</li>
//! <li data-id="0_0_1_0" data-file="https://ashdi.vip/vod/1">1 серія</li>
//! ```
//!
//! A video's composite label is assembled from the tab labels of its id's
//! prefixes.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::SourceConfig;
use crate::model::PlaylistEntry;

/// Joins the segments of a composite label.
pub const LABEL_SEPARATOR: &str = " | ";

/// Label and episode name for entries found outside a playlist block.
pub const DEFAULT_LABEL: &str = "Default";

const ID_DELIMITER: &str = "_";

/// Tab texts that name a player; they disambiguate otherwise identical
/// entries and are never dropped as redundant.
const PLAYER_MARKERS: &[&str] = &["плеєр", "player"];

static STREAM_ENTRY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("[data-file]").unwrap());
static TAB_ENTRY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[data-id]").unwrap());
static INLINE_PLAYER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "video source[src], video[src], .player iframe[src], #player iframe[src], .video-box iframe[src]",
    )
    .unwrap()
});

/// Extract playlist entries from a container (AJAX fragment or full page).
///
/// Entries without a usable reference are skipped. The result is not yet
/// deduplicated or reordered; see [`finalize`].
pub fn parse_playlist(html: &str, config: &SourceConfig) -> Vec<PlaylistEntry> {
    let document = Html::parse_document(html);
    let labels = label_index(&document);

    document
        .select(&STREAM_ENTRY)
        .filter_map(|el| {
            let raw = el.value().attr("data-file").unwrap_or_default();
            let Some(raw_reference) = normalize_reference(raw, config) else {
                debug!(raw, "Skipping playlist entry without reference");
                return None;
            };
            let episode = element_text(el);
            let label = match el.value().attr("data-id") {
                Some(id) => composite_label(id, &episode, &labels),
                None => episode.clone(),
            };
            Some(PlaylistEntry {
                episode,
                label,
                raw_reference,
            })
        })
        .collect()
}

/// Player sources embedded directly in a page that has no playlist block.
pub fn parse_inline_player(html: &str, page_url: &Url) -> Vec<PlaylistEntry> {
    let document = Html::parse_document(html);
    document
        .select(&INLINE_PLAYER)
        .filter_map(|el| el.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
        .filter_map(|src| page_url.join(src.trim()).ok())
        .map(|url| PlaylistEntry {
            episode: DEFAULT_LABEL.to_string(),
            label: DEFAULT_LABEL.to_string(),
            raw_reference: url.into(),
        })
        .collect()
}

/// Drop repeated `(episode, label, url)` rows and optionally reverse into
/// playback order.
pub fn finalize(entries: Vec<PlaylistEntry>, reverse: bool) -> Vec<PlaylistEntry> {
    let mut seen = HashSet::new();
    let mut entries: Vec<PlaylistEntry> = entries
        .into_iter()
        .filter(|e| seen.insert((e.episode.clone(), e.label.clone(), e.raw_reference.clone())))
        .collect();
    if reverse {
        entries.reverse();
    }
    entries
}

/// Map of tab id to tab text, skipping the video rows themselves.
fn label_index(document: &Html) -> HashMap<String, String> {
    document
        .select(&TAB_ENTRY)
        .filter(|el| el.value().attr("data-file").is_none())
        .filter_map(|el| {
            let id = el.value().attr("data-id")?.trim();
            let text = element_text(el);
            (!id.is_empty() && !text.is_empty()).then(|| (id.to_string(), text))
        })
        .collect()
}

/// Build the label for a video with id `id` and display text `display`.
pub fn composite_label(id: &str, display: &str, labels: &HashMap<String, String>) -> String {
    let segments: Vec<&str> = id.trim().split(ID_DELIMITER).collect();
    let mut parts: Vec<&str> = Vec::new();

    for end in 1..=segments.len() {
        let prefix = segments[..end].join(ID_DELIMITER);
        let Some(text) = labels.get(&prefix).map(|t| t.trim()) else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        if is_player_marker(text) {
            parts.push(text);
            continue;
        }
        if text == display || parts.contains(&text) {
            continue;
        }
        parts.push(text);
    }

    if parts.is_empty() {
        display.to_string()
    } else {
        parts.join(LABEL_SEPARATOR)
    }
}

fn is_player_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    PLAYER_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Absolutize protocol- and root-relative references; `None` for empty or
/// `"null"` ones.
pub fn normalize_reference(raw: &str, config: &SourceConfig) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") {
        return None;
    }
    if raw.starts_with('/') {
        return config.absolutize(raw).ok();
    }
    Some(raw.to_string())
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
