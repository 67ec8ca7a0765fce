//! Reduces listing markup to the plain text worth sending to the extractor.
//!
//! Script and style elements are always removed first. Every remaining
//! element whose tag is allow-listed contributes its *direct* text only, so a
//! parent and child that are both allow-listed never capture the same text
//! twice. Each contributing element starts a new line; blank lines are
//! dropped and whitespace runs collapse to a single space.

use scraper::{Html, Selector};

use crate::error::ConfigError;
use crate::{RawContent, ReducedContent};

pub const DENIED_TAGS: &[&str] = &["script", "style"];

pub const DEFAULT_TAGS: &[&str] = &[
    "p", "div", "a", "span", "h1", "h2", "h3", "h4", "h5", "h6",
];

#[derive(Debug, Clone)]
pub struct ReductionConfig {
    allowed_tags: Vec<String>,
    scope: Option<Selector>,
}

impl ReductionConfig {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_tags: Vec<String> = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        allowed_tags.sort();
        allowed_tags.dedup();
        Self {
            allowed_tags,
            scope: None,
        }
    }

    /// Restricts reduction to the first element matching `selector`,
    /// e.g. `#bedroom-type-2`.
    pub fn with_scope(mut self, selector: &str) -> Result<Self, ConfigError> {
        let parsed =
            Selector::parse(selector).map_err(|_| ConfigError::Selector(selector.to_string()))?;
        self.scope = Some(parsed);
        Ok(self)
    }

    pub fn allowed_tags(&self) -> &[String] {
        &self.allowed_tags
    }

    fn allows(&self, tag: &str) -> bool {
        !DENIED_TAGS.contains(&tag) && self.allowed_tags.iter().any(|t| t == tag)
    }
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TAGS)
    }
}

pub fn reduce(raw: &RawContent, config: &ReductionConfig) -> ReducedContent {
    let mut doc = Html::parse_document(&raw.body);
    strip_denied(&mut doc);

    let root = match &config.scope {
        Some(selector) => match doc.select(selector).next() {
            Some(el) => *el,
            None => return ReducedContent::default(),
        },
        None => doc.tree.root(),
    };

    let mut lines = Vec::new();
    for node in root.descendants() {
        let Some(element) = node.value().as_element() else {
            continue;
        };
        if !config.allows(element.name()) {
            continue;
        }

        let token = node
            .children()
            .filter_map(|child| child.value().as_text())
            .map(|text| text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        for line in token.lines() {
            let line = collapse_whitespace(line);
            if !line.is_empty() {
                lines.push(line);
            }
        }
    }

    ReducedContent::from_lines(lines)
}

fn strip_denied(doc: &mut Html) {
    let selector = match Selector::parse(&DENIED_TAGS.join(", ")) {
        Ok(s) => s,
        Err(_) => return,
    };
    let ids: Vec<_> = doc.select(&selector).map(|el| el.id()).collect();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn collapse_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}
