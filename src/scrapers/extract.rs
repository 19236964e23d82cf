//! Post extraction from a rendered page feed.
//!
//! Feed markup is client-rendered, obfuscated and changes without notice, so
//! nothing here relies on a single selector. Extraction is a cascade of
//! ordered strategy lists:
//!
//! - **Containers**: an ordered list of selector sets. The first set that
//!   matches at least one element is used for the whole document; later sets
//!   are never tried, even if the chosen one yields no accepted post.
//! - **Fields**: inside each container element, `message`, `timestamp`,
//!   `image` and `permalink` are each resolved through their own ordered list
//!   of [`Strategy`] records. The first strategy producing a non-empty value
//!   wins for that field.
//!
//! Elements without a message are dropped. An element whose extraction fails
//! is logged and skipped without affecting its siblings. Output order is
//! document order.
//!
//! Two [`CascadeProfile`]s are shipped: `broad` (every container and message
//! selector known to have matched at some point, light denylist) and
//! `narrow` (fewer selectors, denylist of comment/photo fragments).

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ScrapeError};
use crate::models::{ScrapedPost, to_iso};
use crate::scrapers::time;

/// Where a strategy reads its value from once its selector matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSource {
    /// Trimmed text content of the matched element.
    Text,
    /// Value of the named attribute.
    Attr(&'static str),
    /// `datetime` attribute, then `data-utime` (unix seconds), then the
    /// visible label run through the time normalizer.
    Timestamp,
}

/// One step of a field cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    pub selector: &'static str,
    pub source: FieldSource,
    /// Only applies when the container also holds an element matching this.
    pub when: Option<&'static str>,
}

impl Strategy {
    pub const fn text(selector: &'static str) -> Self {
        Self { selector, source: FieldSource::Text, when: None }
    }

    pub const fn text_when(when: &'static str, selector: &'static str) -> Self {
        Self { selector, source: FieldSource::Text, when: Some(when) }
    }

    pub const fn attr(selector: &'static str, name: &'static str) -> Self {
        Self { selector, source: FieldSource::Attr(name), when: None }
    }

    pub const fn timestamp(selector: &'static str) -> Self {
        Self { selector, source: FieldSource::Timestamp, when: None }
    }
}

/// Feed container selectors probed before extraction.
pub const FEED_SELECTORS: &[&str] = &[
    r#"[role="feed"]"#,
    r#"[data-pagelet="FeedUnit"]"#,
    ".userContentWrapper",
];

const BROAD_CONTAINERS: &[&str] = &[
    r#"[role="article"]"#,
    r#"div[data-pagelet="FeedUnit"]"#,
    "div.x1yztbdb",
    "div.x1lliihq",
    ".userContentWrapper",
    r#"[data-ad-preview="message"]"#,
    r#"[data-ad-comet-preview="message"]"#,
];

const NARROW_CONTAINERS: &[&str] = &[
    r#"[role="article"]"#,
    r#"div[data-pagelet="FeedUnit"]"#,
    ".userContentWrapper",
];

const BROAD_MESSAGE: &[Strategy] = &[
    Strategy::text(r#"[data-ad-comet-preview="message"]"#),
    Strategy::text(r#"[data-ad-preview="message"]"#),
    Strategy::text(".x193iq5w"),
    Strategy::text(".xdj266r"),
    Strategy::text(".userContent"),
    Strategy::text(r#"div[data-testid="post_message"]"#),
    Strategy::text_when("video", r#"[data-testid="video_caption"]"#),
    Strategy::text(r#"div[dir="auto"]"#),
];

const NARROW_MESSAGE: &[Strategy] = &[
    Strategy::text(r#"[data-ad-comet-preview="message"]"#),
    Strategy::text(r#"[data-ad-preview="message"]"#),
    Strategy::text(".userContent"),
    Strategy::text_when("video", r#"[data-testid="video_caption"]"#),
    Strategy::text(r#"div[dir="auto"]"#),
];

const TIMESTAMP: &[Strategy] = &[
    Strategy::timestamp(r#"a[role="link"] > span[class]"#),
    Strategy::timestamp(".x1i10hfl time"),
    Strategy::timestamp(r#"[role="link"] .x1i10hfl"#),
    Strategy::timestamp("abbr[data-utime]"),
    Strategy::timestamp(r#"span[id^="jsc"] a[role="link"]"#),
    Strategy::timestamp("span.timestampContent"),
    Strategy::timestamp(r#"a[role="link"] > span.x4k7w5x"#),
];

const IMAGE: &[Strategy] = &[Strategy::attr("img[alt]", "src")];

const PERMALINK: &[Strategy] = &[
    Strategy::attr(r#"a[href*="/posts/"]"#, "href"),
    Strategy::attr(r#"a[href*="/photos/"]"#, "href"),
    Strategy::attr(r#"a[href*="/?story_fbid="]"#, "href"),
    Strategy::attr(r#"a[href*="/permalink/"]"#, "href"),
];

/// A named configuration of the selector cascade and its noise filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeProfile {
    #[default]
    Broad,
    Narrow,
}

impl CascadeProfile {
    pub fn containers(self) -> &'static [&'static str] {
        match self {
            CascadeProfile::Broad => BROAD_CONTAINERS,
            CascadeProfile::Narrow => NARROW_CONTAINERS,
        }
    }

    pub fn message(self) -> &'static [Strategy] {
        match self {
            CascadeProfile::Broad => BROAD_MESSAGE,
            CascadeProfile::Narrow => NARROW_MESSAGE,
        }
    }

    pub fn timestamp(self) -> &'static [Strategy] {
        TIMESTAMP
    }

    pub fn image(self) -> &'static [Strategy] {
        IMAGE
    }

    pub fn permalink(self) -> &'static [Strategy] {
        PERMALINK
    }

    /// Phrases that mark a captured block as chrome rather than a post.
    pub fn denylist(self) -> &'static [&'static str] {
        match self {
            CascadeProfile::Broad => &["see all photos"],
            CascadeProfile::Narrow => &["comment", "photo"],
        }
    }
}

struct CompiledStrategy {
    selector: Selector,
    source: FieldSource,
    when: Option<Selector>,
}

impl CompiledStrategy {
    fn compile(strategy: &Strategy) -> Result<Self> {
        Ok(Self {
            selector: parse_selector(strategy.selector)?,
            source: strategy.source,
            when: strategy.when.map(parse_selector).transpose()?,
        })
    }

    fn resolve(&self, element: ElementRef<'_>, now: DateTime<Utc>) -> Result<Option<String>> {
        if let Some(guard) = &self.when {
            if element.select(guard).next().is_none() {
                return Ok(None);
            }
        }
        let Some(found) = element.select(&self.selector).next() else {
            return Ok(None);
        };
        match self.source {
            FieldSource::Text => Ok(non_empty(text_of(found))),
            FieldSource::Attr(name) => Ok(found.value().attr(name).and_then(|v| non_empty(v.to_string()))),
            FieldSource::Timestamp => resolve_timestamp(found, now),
        }
    }
}

fn resolve_timestamp(found: ElementRef<'_>, now: DateTime<Utc>) -> Result<Option<String>> {
    if let Some(raw) = found.value().attr("datetime").and_then(|v| non_empty(v.to_string())) {
        return Ok(Some(raw));
    }
    if let Some(secs) = found.value().attr("data-utime").and_then(|v| v.trim().parse::<i64>().ok()) {
        if let Some(instant) = DateTime::from_timestamp(secs, 0) {
            return Ok(Some(to_iso(instant)));
        }
    }
    match non_empty(text_of(found)) {
        Some(label) => time::normalize(&label, now).map(|t| Some(to_iso(t))),
        None => Ok(None),
    }
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

fn parse_selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| ScrapeError::Selector {
        selector: raw.to_string(),
        reason: e.to_string(),
    })
}

fn compile_all(strategies: &[Strategy]) -> Result<Vec<CompiledStrategy>> {
    strategies.iter().map(CompiledStrategy::compile).collect()
}

fn first_value(
    strategies: &[CompiledStrategy],
    element: ElementRef<'_>,
    now: DateTime<Utc>,
) -> Result<Option<String>> {
    for strategy in strategies {
        if let Some(value) = strategy.resolve(element, now)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Compiled selector cascade for one [`CascadeProfile`].
pub struct PostExtractor {
    containers: Vec<(&'static str, Selector)>,
    message: Vec<CompiledStrategy>,
    timestamp: Vec<CompiledStrategy>,
    image: Vec<CompiledStrategy>,
    permalink: Vec<CompiledStrategy>,
}

impl PostExtractor {
    /// Compile every selector of `profile`.
    ///
    /// # Errors
    ///
    /// [`ScrapeError::Selector`] if any selector in the profile is invalid.
    pub fn new(profile: CascadeProfile) -> Result<Self> {
        let containers = profile
            .containers()
            .iter()
            .map(|raw| parse_selector(raw).map(|sel| (*raw, sel)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            containers,
            message: compile_all(profile.message())?,
            timestamp: compile_all(profile.timestamp())?,
            image: compile_all(profile.image())?,
            permalink: compile_all(profile.permalink())?,
        })
    }

    /// Extract candidate posts from serialized page HTML.
    #[instrument(level = "info", skip_all, fields(html_bytes = html.len()))]
    pub fn extract(&self, html: &str, now: DateTime<Utc>) -> Vec<ScrapedPost> {
        let document = Html::parse_document(html);
        self.extract_document(&document, now)
    }

    /// Extract candidate posts from a parsed document.
    pub fn extract_document(&self, document: &Html, now: DateTime<Utc>) -> Vec<ScrapedPost> {
        let mut posts = Vec::new();

        for (raw, selector) in &self.containers {
            let elements: Vec<ElementRef<'_>> = document.select(selector).collect();
            debug!(selector = *raw, count = elements.len(), "Tried container selector");
            if elements.is_empty() {
                continue;
            }

            for (index, element) in elements.into_iter().enumerate() {
                match self.extract_element(element, now) {
                    Ok(Some(post)) => posts.push(post),
                    Ok(None) => debug!(index, "Element has no message; skipped"),
                    Err(e) => warn!(index, error = %e, "Error extracting post; skipped"),
                }
            }

            info!(selector = *raw, count = posts.len(), "Extracted posts");
            return posts;
        }

        info!("No container selector matched");
        posts
    }

    fn extract_element(&self, element: ElementRef<'_>, now: DateTime<Utc>) -> Result<Option<ScrapedPost>> {
        let message = first_value(&self.message, element, now)?;
        let created_time = first_value(&self.timestamp, element, now)?;
        let full_picture = first_value(&self.image, element, now)?;
        let permalink_url = first_value(&self.permalink, element, now)?;

        debug!(
            has_message = message.is_some(),
            message_len = message.as_ref().map(|m| m.chars().count()),
            created_time = ?created_time,
            has_link = permalink_url.is_some(),
            "Post candidate"
        );

        Ok(message.map(|message| ScrapedPost {
            message,
            created_time: created_time.unwrap_or_else(|| to_iso(now)),
            full_picture,
            permalink_url: permalink_url.unwrap_or_default(),
        }))
    }
}
