//! Declarative field extraction.
//!
//! Site revisions move fields around, so every field is described by a list
//! of [`FieldRule`]s tried in priority order; the first rule producing a
//! non-empty value wins.

use scraper::{ElementRef, Selector};

/// Pulls one string out of a matched element.
pub trait Extractor: Send + Sync {
    fn extract(&self, el: ElementRef<'_>) -> Option<String>;
}

/// Whitespace-normalized text content.
pub struct Text;

impl Extractor for Text {
    fn extract(&self, el: ElementRef<'_>) -> Option<String> {
        let text = el
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" ");
        non_empty(&text)
    }
}

/// A single attribute value.
pub struct Attr(pub &'static str);

impl Extractor for Attr {
    fn extract(&self, el: ElementRef<'_>) -> Option<String> {
        el.value().attr(self.0).and_then(non_empty)
    }
}

/// The first present attribute out of several (lazy-loaded images carry
/// `data-src` next to a placeholder `src`).
pub struct FirstAttr(pub &'static [&'static str]);

impl Extractor for FirstAttr {
    fn extract(&self, el: ElementRef<'_>) -> Option<String> {
        self.0
            .iter()
            .find_map(|name| el.value().attr(name).and_then(non_empty))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// One `{selector, extractor}` pair.
pub struct FieldRule {
    selector: Selector,
    extractor: Box<dyn Extractor>,
}

impl FieldRule {
    /// Panics on an invalid selector; rules are built from literals.
    pub fn new(css: &str, extractor: impl Extractor + 'static) -> Self {
        Self {
            selector: Selector::parse(css).unwrap(),
            extractor: Box::new(extractor),
        }
    }
}

/// Rules for one field, highest priority first.
pub struct FieldRules(pub Vec<FieldRule>);

impl FieldRules {
    /// First non-empty value, searching below `root`.
    pub fn first(&self, root: ElementRef<'_>) -> Option<String> {
        self.0.iter().find_map(|rule| {
            root.select(&rule.selector)
                .find_map(|el| rule.extractor.extract(el))
        })
    }

    /// Every value of the first rule that yields anything.
    pub fn all(&self, root: ElementRef<'_>) -> Vec<String> {
        self.0
            .iter()
            .map(|rule| {
                let mut values: Vec<String> = Vec::new();
                for value in root
                    .select(&rule.selector)
                    .filter_map(|el| rule.extractor.extract(el))
                {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                }
                values
            })
            .find(|values| !values.is_empty())
            .unwrap_or_default()
    }
}
