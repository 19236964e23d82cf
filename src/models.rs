//! Data models for scraped posts and their persisted representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ScrapedPost`]: a post as extracted from a rendered feed (transient)
//! - [`BotIdentity`]: the synthetic author every ingested post is attributed to
//! - [`NewPost`]: the create request handed to the persistence boundary
//! - [`PostRecord`]: what the store returns for a created post
//!
//! Wire names of [`ScrapedPost`] stay snake_case (`created_time`,
//! `full_picture`, `permalink_url`) to match what existing API clients read.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::truncate_chars;

/// Maximum number of characters kept in a persisted post title.
pub const TITLE_MAX_CHARS: usize = 255;

/// Tag attached to every post ingested from a page feed.
pub const SOURCE_TAG: &str = "Facebook";

/// A post extracted from a page feed.
///
/// `created_time` is kept as ISO-8601 text: it is either a machine-readable
/// attribute copied from the document or the output of the time normalizer,
/// and is only parsed into an instant on the save path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedPost {
    /// The post body text, trimmed.
    pub message: String,
    /// When the post was published.
    pub created_time: String,
    /// URL of the first captioned image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_picture: Option<String>,
    /// Link to the post itself; empty when none was found.
    #[serde(default)]
    pub permalink_url: String,
}

/// Synthetic author record used to attribute machine-ingested posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl BotIdentity {
    /// The identity every page-feed post is attributed to.
    pub fn facebook() -> Self {
        Self {
            id: "facebook-bot".to_string(),
            name: "Facebook Bot".to_string(),
            email: "facebook-bot@system.local".to_string(),
        }
    }
}

/// A post ready to be created in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub image: Option<String>,
    pub tag_names: Vec<String>,
}

impl NewPost {
    /// Build the create request for `post`, attributed to `author_id`.
    pub fn from_scraped(post: &ScrapedPost, author_id: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            title: post_title(&post.message),
            body: post.message.clone(),
            author_id: author_id.to_string(),
            created_at,
            image: post.full_picture.clone(),
            tag_names: vec![SOURCE_TAG.to_string()],
        }
    }
}

/// A post as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    pub image: Option<String>,
    pub tags: Vec<String>,
}

/// Title stored for a message: its first [`TITLE_MAX_CHARS`] characters.
pub fn post_title(message: &str) -> String {
    truncate_chars(message, TITLE_MAX_CHARS).to_string()
}

/// Render an instant the way the store and API expect it
/// (`2024-01-01T00:00:00.000Z`).
pub fn to_iso(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}
