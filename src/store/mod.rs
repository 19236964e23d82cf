//! Persistence boundary and the idempotent save path.
//!
//! The store itself belongs to the web application; this crate only needs
//! three operations from it, captured by [`PostStore`]:
//!
//! - look up or create the bot identity posts are attributed to,
//! - check whether a post with a given `(title, created_at)` exists,
//! - create a tagged post.
//!
//! [`PostSaver`] layers deduplication on top: a post is created at most once
//! per `(title, created_at)`. The check and the insert are not atomic, so two
//! runs saving the same post at the same moment can both insert it.
//!
//! # Implementations
//!
//! | Store | Module | Notes |
//! |-------|--------|-------|
//! | Postgres | [`postgres`] | Application schema via `sqlx`, one transaction per post |
//! | In-memory | [`memory`] | Tests and runs without a database |

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::error::{Result, ScrapeError};
use crate::models::{NewPost, PostRecord, ScrapedPost, post_title};
use crate::scrapers::time::parse_instant;
use crate::utils::truncate_for_log;

pub use memory::MemoryPostStore;
pub use postgres::PgPostStore;

#[async_trait]
pub trait PostStore: Send + Sync {
    /// Return the bot identity's id, creating the identity if needed.
    async fn get_or_create_bot_identity(&self) -> Result<String>;

    async fn post_exists(&self, title: &str, created_at: DateTime<Utc>) -> Result<bool>;

    /// Create `post`, creating any missing tag by name.
    async fn create_post(&self, post: &NewPost) -> Result<PostRecord>;
}

#[async_trait]
impl<T: PostStore + ?Sized> PostStore for Arc<T> {
    async fn get_or_create_bot_identity(&self) -> Result<String> {
        (**self).get_or_create_bot_identity().await
    }

    async fn post_exists(&self, title: &str, created_at: DateTime<Utc>) -> Result<bool> {
        (**self).post_exists(title, created_at).await
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostRecord> {
        (**self).create_post(post).await
    }
}

/// What happened to one post on the save path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Created(PostRecord),
    /// A post with the same title and creation time is already stored.
    Skipped,
}

/// Deduplicating writer over a [`PostStore`].
pub struct PostSaver<S> {
    store: S,
    bot_id: OnceCell<String>,
}

impl<S: PostStore> PostSaver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            bot_id: OnceCell::new(),
        }
    }

    #[cfg(test)]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Save `post` unless it is already stored.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::InvalidDateFormat`] if `created_time` is not an instant
    /// - [`ScrapeError::Persistence`] if the store fails
    ///
    /// Both concern this post only.
    #[instrument(level = "info", skip_all, fields(created_time = %post.created_time))]
    pub async fn save(&self, post: &ScrapedPost) -> Result<SaveOutcome> {
        let created_at = parse_instant(&post.created_time)
            .ok_or_else(|| ScrapeError::InvalidDateFormat(post.created_time.clone()))?;
        let title = post_title(&post.message);

        if self.store.post_exists(&title, created_at).await? {
            debug!(title = %truncate_for_log(&title, 80), "Post already stored; skipping");
            return Ok(SaveOutcome::Skipped);
        }

        let author_id = self
            .bot_id
            .get_or_try_init(|| self.store.get_or_create_bot_identity())
            .await?;

        let record = self
            .store
            .create_post(&NewPost::from_scraped(post, author_id, created_at))
            .await?;
        info!(id = %record.id, message = %truncate_for_log(&post.message, 100), "Post saved");
        Ok(SaveOutcome::Created(record))
    }
}
