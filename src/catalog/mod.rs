//! Catalog browsing: listings, search, detail pages and episode lists.
//!
//! Pages are plain DLE templates; every field goes through a
//! [`FieldRules`] table so a markup change means editing a table entry.

pub mod selectors;

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::http_client::SiteClient;
use crate::model::{AnimeDetails, AnimeItem, AnimePage, EpisodeReference};
use crate::stream::locator::content_id_from_url;
use crate::stream::PlaylistLocator;
use selectors::{Attr, FieldRule, FieldRules, FirstAttr, Text};

/// Results per search page; `result_from` advances by this much.
pub const SEARCH_PAGE_SIZE: usize = 40;

const IMAGE_ATTRS: &[&str] = &["data-src", "data-original", "src"];

static LISTING_ITEM: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("article.story, div.story, div.anime-card, .anime-item").unwrap()
});
static PAGE_LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

static ITEM_TITLE: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new("h2[itemprop='name'] a", Text),
        FieldRule::new(".story_c h2 a", Text),
        FieldRule::new("h2 a", Text),
        FieldRule::new("h2", Text),
        FieldRule::new("img", Attr("alt")),
    ])
});
static ITEM_LINK: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new("h2 a[href]", Attr("href")),
        FieldRule::new("a[href$='.html']", Attr("href")),
        FieldRule::new("a[href]", Attr("href")),
    ])
});
static ITEM_POSTER: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new(".story_c_left img", FirstAttr(IMAGE_ATTRS)),
        FieldRule::new(".story_post img", FirstAttr(IMAGE_ATTRS)),
        FieldRule::new("img", FirstAttr(IMAGE_ATTRS)),
    ])
});

static DETAIL_TITLE: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new("h2[itemprop='name']", Text),
        FieldRule::new(".story_c h2", Text),
        FieldRule::new("h1", Text),
        FieldRule::new("meta[property='og:title']", Attr("content")),
        FieldRule::new("title", Text),
    ])
});
static DETAIL_POSTER: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new(".story_c_left img", FirstAttr(IMAGE_ATTRS)),
        FieldRule::new(".story_post img", FirstAttr(IMAGE_ATTRS)),
        FieldRule::new("meta[property='og:image']", Attr("content")),
    ])
});
static DETAIL_DESCRIPTION: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new("div.my-text", Text),
        FieldRule::new("[itemprop='description']", Text),
        FieldRule::new(".story_c_text .full-text", Text),
        FieldRule::new("meta[name='description']", Attr("content")),
        FieldRule::new("meta[property='og:description']", Attr("content")),
    ])
});
static DETAIL_GENRES: LazyLock<FieldRules> = LazyLock::new(|| {
    FieldRules(vec![
        FieldRule::new("[itemprop='genre'] a", Text),
        FieldRule::new("span[itemprop='genre']", Text),
        FieldRule::new(".story_infa a[href*='/anime/']", Text),
        FieldRule::new(".story_c_text a[href*='/anime/']", Text),
    ])
});

/// Catalog operations against the site.
#[derive(Clone)]
pub struct Catalog {
    client: SiteClient,
    locator: PlaylistLocator,
}

impl Catalog {
    pub fn new(client: SiteClient) -> Self {
        Self {
            locator: PlaylistLocator::new(client.clone()),
            client,
        }
    }

    /// `/anime/` for the first page, `/anime/page/<n>/` after.
    pub fn popular_url(config: &SourceConfig, page: u32) -> String {
        if page <= 1 {
            format!("{}/anime/", config.origin_str())
        } else {
            format!("{}/anime/page/{page}/", config.origin_str())
        }
    }

    /// DLE search form fields for `query` on 1-based `page`.
    pub fn search_form(query: &str, page: u32) -> Vec<(&'static str, String)> {
        let offset = (page.max(1) as usize - 1) * SEARCH_PAGE_SIZE + 1;
        vec![
            ("do", "search".to_string()),
            ("subaction", "search".to_string()),
            ("fullsearch", "1".to_string()),
            ("result_from", offset.to_string()),
            ("story", query.to_string()),
        ]
    }

    #[instrument(skip(self))]
    pub async fn list_popular(&self, page: u32) -> Result<AnimePage> {
        let config = self.client.config();
        let html = self
            .client
            .get_text(&Self::popular_url(config, page), None)
            .await?;
        let listing = parse_listing(&html, config, page.max(1));
        debug!(items = listing.items.len(), "Popular page parsed");
        Ok(listing)
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str, page: u32) -> Result<AnimePage> {
        let config = self.client.config();
        let url = format!("{}/index.php?do=search", config.origin_str());
        let html = self
            .client
            .post_form(&url, &Self::search_form(query, page))
            .await?;
        let mut listing = parse_listing(&html, config, page.max(1));
        listing.has_next_page |= listing.items.len() >= SEARCH_PAGE_SIZE;
        debug!(items = listing.items.len(), "Search page parsed");
        Ok(listing)
    }

    #[instrument(skip(self))]
    pub async fn fetch_details(&self, url: &str) -> Result<AnimeDetails> {
        let html = self.client.get_text(url, None).await?;
        Ok(parse_details(&html, self.client.config()))
    }

    /// One reference per distinct episode in the anime's playlist, ordered
    /// by episode number.
    #[instrument(skip(self))]
    pub async fn list_episodes(&self, url: &str) -> Result<Vec<EpisodeReference>> {
        let entries = self.locator.locate(&EpisodeReference::new(url)).await?;
        let content_id = content_id_from_url(url);

        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            if !names.contains(&entry.episode) {
                names.push(entry.episode);
            }
        }
        names.sort_by_key(|name| episode_number(name).unwrap_or(u32::MAX));

        Ok(names
            .into_iter()
            .map(|name| EpisodeReference {
                url: url.to_string(),
                content_id: content_id.clone(),
                episode: Some(name),
            })
            .collect())
    }
}

/// Leading number of an episode name (`"12 серія"` → 12).
fn episode_number(name: &str) -> Option<u32> {
    let digits: String = name
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Parse a listing or search results page.
pub fn parse_listing(html: &str, config: &SourceConfig, page: u32) -> AnimePage {
    let document = Html::parse_document(html);
    let items = document
        .select(&LISTING_ITEM)
        .filter_map(|el| parse_item(el, config))
        .collect();

    AnimePage {
        items,
        has_next_page: page
            .checked_add(1)
            .is_some_and(|next| links_to_page(&document, next)),
    }
}

fn parse_item(el: ElementRef<'_>, config: &SourceConfig) -> Option<AnimeItem> {
    let url = config.absolutize(&ITEM_LINK.first(el)?).ok()?;
    let title = ITEM_TITLE.first(el)?;
    let poster_url = ITEM_POSTER
        .first(el)
        .and_then(|src| config.absolutize(&src).ok());
    Some(AnimeItem {
        title,
        url,
        poster_url,
    })
}

/// Pagination link to `page`, either a `/page/<n>/` href or a DLE
/// `list_submit(<n>)` search handler.
fn links_to_page(document: &Html, page: u32) -> bool {
    let path = format!("/page/{page}");
    let submit = format!("list_submit({page})");
    document.select(&PAGE_LINK).any(|a| {
        let href = a.value().attr("href").unwrap_or_default().trim_end_matches('/');
        let onclick = a.value().attr("onclick").unwrap_or_default();
        href.ends_with(&path) || onclick.contains(&submit)
    })
}

/// Parse an anime detail page.
pub fn parse_details(html: &str, config: &SourceConfig) -> AnimeDetails {
    let document = Html::parse_document(html);
    let root = document.root_element();
    AnimeDetails {
        title: DETAIL_TITLE.first(root).unwrap_or_default(),
        poster_url: DETAIL_POSTER
            .first(root)
            .and_then(|src| config.absolutize(&src).ok()),
        description: DETAIL_DESCRIPTION.first(root),
        genres: DETAIL_GENRES.all(root),
    }
}
