//! In-process [`PostStore`], used when no database is configured.
//!
//! Nothing survives a restart, so deduplication only holds within one process.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, ScrapeError};
use crate::models::{BotIdentity, NewPost, PostRecord};
use crate::store::PostStore;

#[derive(Default)]
struct State {
    bot: Option<BotIdentity>,
    posts: Vec<PostRecord>,
    tags: BTreeSet<String>,
}

#[derive(Default)]
pub struct MemoryPostStore {
    state: Mutex<State>,
    bot_identity_calls: AtomicUsize,
    create_calls: AtomicUsize,
    fail_writes: bool,
}

impl MemoryPostStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ScrapeError::Persistence("memory store lock poisoned".to_string()))
    }
}

#[cfg(test)]
impl MemoryPostStore {
    /// Every `create_post` fails.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Seed a post as if an earlier run had stored it.
    pub fn insert_existing(&self, title: &str, created_at: DateTime<Utc>) {
        self.state.lock().unwrap().posts.push(PostRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            body: title.to_string(),
            author_id: BotIdentity::facebook().id,
            created_at,
            image: None,
            tags: Vec::new(),
        });
    }

    pub fn posts(&self) -> Vec<PostRecord> {
        self.state.lock().unwrap().posts.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn bot_identity_calls(&self) -> usize {
        self.bot_identity_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    async fn get_or_create_bot_identity(&self) -> Result<String> {
        self.bot_identity_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state()?;
        let bot = state.bot.get_or_insert_with(BotIdentity::facebook);
        Ok(bot.id.clone())
    }

    async fn post_exists(&self, title: &str, created_at: DateTime<Utc>) -> Result<bool> {
        let state = self.state()?;
        Ok(state
            .posts
            .iter()
            .any(|p| p.title == title && p.created_at == created_at))
    }

    async fn create_post(&self, post: &NewPost) -> Result<PostRecord> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(ScrapeError::Persistence("write refused".to_string()));
        }
        let mut state = self.state()?;
        for tag in &post.tag_names {
            state.tags.insert(tag.clone());
        }
        let record = PostRecord {
            id: Uuid::new_v4().to_string(),
            title: post.title.clone(),
            body: post.body.clone(),
            author_id: post.author_id.clone(),
            created_at: post.created_at,
            image: post.image.clone(),
            tags: post.tag_names.clone(),
        };
        state.posts.push(record.clone());
        Ok(record)
    }
}
