//! One scrape run across every configured source.
//!
//! Sources are processed strictly one after another, each in its own browser
//! session. Failures are contained at the narrowest boundary that can absorb
//! them:
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Launch failure, bad config | Run aborted, error returned |
//! | Navigation timeout, browser fault in a session | Source skipped, run continues |
//! | No feed found | Source yields no posts |
//! | Element extraction error | Element skipped |
//! | Invalid date, store error | Post skipped |
//!
//! The returned [`RunReport`] carries every post that survived filtering, in
//! source order then document order, whether or not it was persisted.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::models::ScrapedPost;
use crate::scrapers::facebook::FeedScraper;
use crate::store::{PostSaver, PostStore, SaveOutcome};
use crate::utils::truncate_for_log;

/// What a run does with the posts it scrapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    ScrapeOnly,
    ScrapeAndPersist,
}

/// Outcome for a single source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub url: String,
    pub scraped: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub results: Vec<ScrapedPost>,
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    /// Emit one summary line per source plus a total.
    pub fn log_summary(&self) {
        for source in &self.sources {
            info!(
                url = %source.url,
                scraped = source.scraped,
                saved = source.saved,
                skipped = source.skipped,
                failed = source.failed,
                error = source.error.as_deref().unwrap_or(""),
                "Source summary"
            );
        }
        info!(
            sources = self.sources.len(),
            posts = self.results.len(),
            saved = self.sources.iter().map(|s| s.saved).sum::<usize>(),
            "Run summary"
        );
    }
}

pub struct SourcePipeline {
    scraper: FeedScraper,
    saver: PostSaver<Arc<dyn PostStore>>,
    sources: Vec<String>,
}

impl SourcePipeline {
    pub fn new(scraper: FeedScraper, store: Arc<dyn PostStore>, sources: Vec<String>) -> Self {
        Self {
            scraper,
            saver: PostSaver::new(store),
            sources,
        }
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Scrape every source in order and, in [`RunMode::ScrapeAndPersist`],
    /// save each kept post.
    ///
    /// # Errors
    ///
    /// Only errors for which [`ScrapeError::is_fatal`](crate::error::ScrapeError::is_fatal)
    /// holds; everything else is recorded in the report.
    #[instrument(level = "info", skip(self), fields(sources = self.sources.len()))]
    pub async fn run(&self, mode: RunMode) -> Result<RunReport> {
        let start_time = std::time::Instant::now();
        let mut report = RunReport {
            started_at: Utc::now(),
            results: Vec::new(),
            sources: Vec::with_capacity(self.sources.len()),
        };

        for url in &self.sources {
            let mut source = SourceReport {
                url: url.clone(),
                ..SourceReport::default()
            };

            match self.scraper.scrape(url).await {
                Ok(posts) => {
                    source.scraped = posts.len();
                    if mode == RunMode::ScrapeAndPersist {
                        self.persist(&posts, &mut source).await;
                    }
                    report.results.extend(posts);
                }
                Err(e) if e.is_fatal() => {
                    error!(%url, error = %e, "Run aborted");
                    return Err(e);
                }
                Err(e) => {
                    warn!(%url, error = %e, "Source failed; continuing with next source");
                    source.error = Some(e.to_string());
                }
            }
            report.sources.push(source);
        }

        let elapsed = start_time.elapsed();
        info!(?elapsed, posts = report.results.len(), "Run complete");
        report.log_summary();
        Ok(report)
    }

    async fn persist(&self, posts: &[ScrapedPost], source: &mut SourceReport) {
        for post in posts {
            match self.saver.save(post).await {
                Ok(SaveOutcome::Created(_)) => source.saved += 1,
                Ok(SaveOutcome::Skipped) => source.skipped += 1,
                Err(e) => {
                    source.failed += 1;
                    warn!(
                        error = %e,
                        message = %truncate_for_log(&post.message, 80),
                        "Error saving post"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScrapeError;
    use crate::scrapers::facebook::ScrapeSettings;
    use crate::scrapers::scroll::ScrollConfig;
    use crate::scrapers::testing::{FakeLauncher, FakePage};
    use crate::store::MemoryPostStore;
    use std::time::Duration;

    const LRTA: &str = "https://www.facebook.com/OfficialLRTA";
    const LRT1: &str = "https://www.facebook.com/officialLRT1";
    const FEED: &str = r#"[role="feed"]"#;

    const LRTA_HTML: &str = r#"
        <html><body><div role="feed">
          <div role="article">
            <div data-ad-preview="message">hi!!</div>
            <abbr data-utime="1709280000">Mar 1</abbr>
          </div>
          <div role="article">
            <div data-ad-preview="message">LRT-2 operations resume at 5 AM tomorrow.</div>
            <abbr data-utime="1709283600">Mar 1</abbr>
            <a href="/OfficialLRTA/posts/2">link</a>
          </div>
        </div></body></html>
    "#;

    const LRT1_HTML: &str = r#"
        <html><body><div role="feed">
          <div role="article">
            <div data-ad-preview="message">LRT-1 extends operating hours this weekend.</div>
            <abbr data-utime="1709287200">Mar 1</abbr>
          </div>
        </div></body></html>
    "#;

    fn settings() -> ScrapeSettings {
        ScrapeSettings {
            scroll: ScrollConfig {
                tick: Duration::from_millis(1),
                ..ScrollConfig::default()
            },
            probe_timeout: Duration::from_millis(1),
            ..ScrapeSettings::default()
        }
    }

    fn pipeline(launcher: FakeLauncher, store: Arc<MemoryPostStore>, sources: &[&str]) -> SourcePipeline {
        let scraper = FeedScraper::new(Arc::new(launcher), settings()).unwrap();
        SourcePipeline::new(scraper, store, sources.iter().map(|s| s.to_string()).collect())
    }

    fn both_pages() -> FakeLauncher {
        FakeLauncher::new()
            .with_page(LRTA, FakePage::new(LRTA_HTML).with_selectors(&[FEED]))
            .with_page(LRT1, FakePage::new(LRT1_HTML).with_selectors(&[FEED]))
    }

    #[tokio::test]
    async fn test_scrape_only_returns_filtered_posts_in_source_order() {
        let store = Arc::new(MemoryPostStore::new());
        let report = pipeline(both_pages(), store.clone(), &[LRTA, LRT1])
            .run(RunMode::ScrapeOnly)
            .await
            .unwrap();

        let messages: Vec<_> = report.results.iter().map(|p| p.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "LRT-2 operations resume at 5 AM tomorrow.",
                "LRT-1 extends operating hours this weekend.",
            ]
        );
        assert_eq!(report.results[0].created_time, "2024-03-01T09:00:00.000Z");
        assert!(store.posts().is_empty());
    }

    #[tokio::test]
    async fn test_persisting_twice_is_idempotent() {
        let store = Arc::new(MemoryPostStore::new());
        let pipeline = pipeline(both_pages(), store.clone(), &[LRTA, LRT1]);

        let first = pipeline.run(RunMode::ScrapeAndPersist).await.unwrap();
        assert_eq!(first.sources[0].saved, 1);
        assert_eq!(first.sources[1].saved, 1);

        let second = pipeline.run(RunMode::ScrapeAndPersist).await.unwrap();
        assert_eq!(second.sources[0].skipped, 1);
        assert_eq!(second.sources[1].skipped, 1);
        assert_eq!(second.results.len(), 2);

        let posts = store.posts();
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.tags == vec!["Facebook".to_string()]));
        assert_eq!(store.bot_identity_calls(), 1);
    }

    #[tokio::test]
    async fn test_source_without_feed_is_empty_success() {
        let launcher = FakeLauncher::new().with_page(LRTA, FakePage::new(LRTA_HTML));
        let report = pipeline(launcher, Arc::new(MemoryPostStore::new()), &[LRTA])
            .run(RunMode::ScrapeOnly)
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.sources[0].error, None);
    }

    #[tokio::test]
    async fn test_navigation_timeout_does_not_stop_later_sources() {
        let launcher = FakeLauncher::new().with_page(LRT1, FakePage::new(LRT1_HTML).with_selectors(&[FEED]));
        let report = pipeline(launcher, Arc::new(MemoryPostStore::new()), &[LRTA, LRT1])
            .run(RunMode::ScrapeOnly)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 1);
        assert!(report.sources[0].error.as_deref().unwrap().contains("timed out"));
        assert_eq!(report.sources[1].scraped, 1);
    }

    #[tokio::test]
    async fn test_browser_fault_on_one_source_does_not_stop_the_next() {
        let launcher = Arc::new(
            FakeLauncher::new()
                .with_page(LRTA, FakePage::new(LRTA_HTML).with_navigation_fault("net::ERR_NAME_NOT_RESOLVED"))
                .with_page(LRT1, FakePage::new(LRT1_HTML).with_selectors(&[FEED])),
        );
        let scraper = FeedScraper::new(launcher.clone(), settings()).unwrap();
        let store = Arc::new(MemoryPostStore::new());
        let pipeline = SourcePipeline::new(scraper, store.clone(), vec![LRTA.to_string(), LRT1.to_string()]);

        let report = pipeline.run(RunMode::ScrapeAndPersist).await.unwrap();

        let error = report.sources[0].error.as_deref().unwrap();
        assert!(error.contains("net::ERR_NAME_NOT_RESOLVED"), "{error}");
        assert_eq!(report.sources[0].scraped, 0);
        assert_eq!(report.sources[1].error, None);
        assert_eq!(report.sources[1].saved, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].message, "LRT-1 extends operating hours this weekend.");
        assert_eq!(store.posts().len(), 1);
        assert_eq!(launcher.closed(), 2);
    }

    #[tokio::test]
    async fn test_sessions_closed_for_every_source() {
        let launcher = Arc::new(FakeLauncher::new().with_page(LRT1, FakePage::new(LRT1_HTML).with_selectors(&[FEED])));
        let scraper = FeedScraper::new(launcher.clone(), settings()).unwrap();
        let pipeline = SourcePipeline::new(
            scraper,
            Arc::new(MemoryPostStore::new()),
            vec![LRTA.to_string(), LRT1.to_string()],
        );

        pipeline.run(RunMode::ScrapeOnly).await.unwrap();
        assert_eq!(launcher.opened(), 2);
        assert_eq!(launcher.closed(), 2);
    }

    #[tokio::test]
    async fn test_launch_failure_aborts_run() {
        let err = pipeline(FakeLauncher::failing(), Arc::new(MemoryPostStore::new()), &[LRTA, LRT1])
            .run(RunMode::ScrapeOnly)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::LaunchFailure(_)));
    }

    #[tokio::test]
    async fn test_store_failures_counted_per_post() {
        let store = Arc::new(MemoryPostStore::new().failing_writes());
        let report = pipeline(both_pages(), store, &[LRTA, LRT1])
            .run(RunMode::ScrapeAndPersist)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.sources[0].failed, 1);
        assert_eq!(report.sources[1].failed, 1);
    }
}
