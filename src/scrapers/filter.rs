//! Noise filter applied to extracted posts.
//!
//! The selector cascade regularly captures UI chrome ("See all photos") or
//! comment-thread fragments as if they were top-level posts. A post survives
//! only if its message is longer than [`MIN_MESSAGE_CHARS`] characters and
//! contains none of the configured phrases, compared case-insensitively.

use crate::models::ScrapedPost;

/// Messages of this many characters or fewer are dropped.
pub const MIN_MESSAGE_CHARS: usize = 10;

#[derive(Debug, Clone)]
pub struct ContentFilter {
    min_chars: usize,
    denylist: Vec<String>,
}

impl ContentFilter {
    pub fn new<I, S>(denylist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            min_chars: MIN_MESSAGE_CHARS,
            denylist: denylist
                .into_iter()
                .map(|phrase| phrase.as_ref().to_lowercase())
                .collect(),
        }
    }

    /// Whether `post` should be kept.
    pub fn accepts(&self, post: &ScrapedPost) -> bool {
        let message = post.message.trim();
        if message.chars().count() <= self.min_chars {
            return false;
        }
        let lowered = message.to_lowercase();
        !self.denylist.iter().any(|phrase| lowered.contains(phrase.as_str()))
    }

    /// Keep the accepted posts, preserving order.
    pub fn apply(&self, posts: Vec<ScrapedPost>) -> Vec<ScrapedPost> {
        posts.into_iter().filter(|p| self.accepts(p)).collect()
    }
}
