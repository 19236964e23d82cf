//! Facebook page feed scraper.
//!
//! Scrapes the public post stream of one Facebook page per call. Each call
//! gets its own browser session which is closed before returning, whatever
//! the outcome.
//!
//! # Stages
//!
//! 1. Navigate to the page (with `access_token` appended when configured)
//! 2. Locate the feed container ([`locate_feed`])
//! 3. Scroll until the feed stops growing ([`auto_scroll`])
//! 4. Extract posts from the rendered HTML ([`PostExtractor`])
//! 5. Drop noise ([`ContentFilter`])
//!
//! A page without a recognizable feed yields no posts rather than an error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::models::ScrapedPost;
use crate::scrapers::extract::{CascadeProfile, FEED_SELECTORS, PostExtractor};
use crate::scrapers::filter::ContentFilter;
use crate::scrapers::locate::{PROBE_TIMEOUT, locate_feed};
use crate::scrapers::scroll::{ScrollConfig, auto_scroll};
use crate::scrapers::session::{BrowserSession, SessionConfig, SessionLauncher};
use crate::utils::truncate_for_log;

/// Everything that shapes how a single page is scraped.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub profile: CascadeProfile,
    pub session: SessionConfig,
    pub scroll: ScrollConfig,
    pub probe_timeout: Duration,
    pub access_token: Option<String>,
    /// Full-page PNG written here after scrolling, overwritten per source.
    pub debug_screenshot: Option<PathBuf>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            profile: CascadeProfile::default(),
            session: SessionConfig::default(),
            scroll: ScrollConfig::default(),
            probe_timeout: PROBE_TIMEOUT,
            access_token: None,
            debug_screenshot: None,
        }
    }
}

pub struct FeedScraper {
    launcher: Arc<dyn SessionLauncher>,
    settings: ScrapeSettings,
    extractor: PostExtractor,
    filter: ContentFilter,
}

impl FeedScraper {
    /// # Errors
    ///
    /// [`ScrapeError::Selector`] if the profile's cascade does not compile.
    pub fn new(launcher: Arc<dyn SessionLauncher>, settings: ScrapeSettings) -> Result<Self> {
        let extractor = PostExtractor::new(settings.profile)?;
        let filter = ContentFilter::new(settings.profile.denylist());
        Ok(Self {
            launcher,
            settings,
            extractor,
            filter,
        })
    }

    /// Scrape the posts of the page at `url`.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::LaunchFailure`] when no browser could be started
    /// - [`ScrapeError::NavigationTimeout`] when the page never settled
    /// - [`ScrapeError::Browser`] on any other browser fault
    #[instrument(level = "info", skip(self))]
    pub async fn scrape(&self, url: &str) -> Result<Vec<ScrapedPost>> {
        let target = page_url(url, self.settings.access_token.as_deref())?;
        let session = self.launcher.open(&self.settings.session).await?;

        let outcome = self.scrape_with(session.as_ref(), &target).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "Failed to close browser session");
        }
        outcome
    }

    async fn scrape_with(&self, session: &dyn BrowserSession, target: &str) -> Result<Vec<ScrapedPost>> {
        info!("Navigating to page");
        session.navigate(target, self.settings.session.navigation_timeout).await?;

        match locate_feed(session, FEED_SELECTORS, self.settings.probe_timeout).await {
            Ok(_) => {}
            Err(ScrapeError::FeedNotFound { tried }) => {
                warn!(%tried, "Could not find feed; no posts for this page");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        auto_scroll(session, self.settings.scroll).await?;

        if let Some(path) = &self.settings.debug_screenshot {
            match session.screenshot(path).await {
                Ok(()) => info!(path = %path.display(), "Saved debug screenshot"),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to save debug screenshot"),
            }
        }

        let html = session.content().await?;
        debug!(html_bytes = html.len(), "Page HTML captured");

        let extracted = self.extractor.extract(&html, Utc::now());
        let total = extracted.len();
        let posts = self.filter.apply(extracted);

        for post in &posts {
            debug!(
                message = %truncate_for_log(&post.message, 80),
                created_time = %post.created_time,
                "Kept post"
            );
        }
        info!(extracted = total, kept = posts.len(), "Scraped page");
        Ok(posts)
    }
}

/// `url` with the `access_token` query parameter appended when a token is set.
fn page_url(url: &str, access_token: Option<&str>) -> Result<String> {
    let Some(token) = access_token else {
        return Ok(url.to_string());
    };
    let mut parsed = Url::parse(url).map_err(|e| ScrapeError::Config(format!("invalid source url {url}: {e}")))?;
    parsed.query_pairs_mut().append_pair("access_token", token);
    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::testing::{FakeLauncher, FakePage};

    const PAGE: &str = "https://www.facebook.com/OfficialLRTA";

    const FEED_HTML: &str = r#"
        <html><body>
          <div role="feed">
            <div role="article">
              <div data-ad-preview="message">hi!!</div>
              <a role="link" href="/OfficialLRTA/posts/1"><span class="x">2 hrs</span></a>
            </div>
            <div role="article">
              <div data-ad-preview="message">LRT-1 trains will run until 10 PM tonight.</div>
              <a role="link" href="/OfficialLRTA/posts/2"><span class="x">45 mins</span></a>
            </div>
          </div>
        </body></html>
    "#;

    fn fast_settings() -> ScrapeSettings {
        ScrapeSettings {
            scroll: ScrollConfig {
                tick: Duration::from_millis(1),
                ..ScrollConfig::default()
            },
            probe_timeout: Duration::from_millis(1),
            ..ScrapeSettings::default()
        }
    }

    fn scraper(launcher: &Arc<FakeLauncher>) -> FeedScraper {
        FeedScraper::new(launcher.clone(), fast_settings()).unwrap()
    }

    #[tokio::test]
    async fn test_scrape_keeps_only_long_posts() {
        let launcher = Arc::new(
            FakeLauncher::new().with_page(PAGE, FakePage::new(FEED_HTML).with_selectors(&[r#"[role="feed"]"#])),
        );
        let posts = scraper(&launcher).scrape(PAGE).await.unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].message, "LRT-1 trains will run until 10 PM tonight.");
        assert_eq!(posts[0].permalink_url, "/OfficialLRTA/posts/2");
        assert_eq!(launcher.opened(), 1);
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_missing_feed_yields_no_posts() {
        // Posts are in the markup, but no feed container was ever detected.
        let launcher = Arc::new(FakeLauncher::new().with_page(PAGE, FakePage::new(FEED_HTML)));
        let posts = scraper(&launcher).scrape(PAGE).await.unwrap();

        assert!(posts.is_empty());
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_navigation_timeout_still_closes_session() {
        let launcher = Arc::new(FakeLauncher::new());
        let err = scraper(&launcher).scrape(PAGE).await.unwrap_err();

        assert!(matches!(err, ScrapeError::NavigationTimeout { .. }));
        assert_eq!(launcher.opened(), 1);
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_opens_nothing() {
        let launcher = Arc::new(FakeLauncher::failing());
        let err = scraper(&launcher).scrape(PAGE).await.unwrap_err();

        assert!(matches!(err, ScrapeError::LaunchFailure(_)));
        assert!(err.is_fatal());
        assert_eq!(launcher.closed(), 0);
    }

    #[tokio::test]
    async fn test_debug_screenshot_taken_after_scrolling() {
        let launcher = Arc::new(
            FakeLauncher::new().with_page(PAGE, FakePage::new(FEED_HTML).with_selectors(&[r#"[role="feed"]"#])),
        );
        let path = PathBuf::from("/tmp/feed_ingest-debug.png");
        let settings = ScrapeSettings {
            debug_screenshot: Some(path.clone()),
            ..fast_settings()
        };
        let posts = FeedScraper::new(launcher.clone(), settings).unwrap().scrape(PAGE).await.unwrap();

        assert_eq!(posts.len(), 1);
        let shots = launcher.screenshots();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].path, path);
        assert!(shots[0].scrolls_before > 0);
    }

    #[tokio::test]
    async fn test_failed_screenshot_does_not_fail_scrape() {
        let launcher = Arc::new(
            FakeLauncher::new().with_page(
                PAGE,
                FakePage::new(FEED_HTML)
                    .with_selectors(&[r#"[role="feed"]"#])
                    .with_screenshot_fault("Permission denied"),
            ),
        );
        let settings = ScrapeSettings {
            debug_screenshot: Some(PathBuf::from("/nonexistent/debug.png")),
            ..fast_settings()
        };
        let posts = FeedScraper::new(launcher.clone(), settings).unwrap().scrape(PAGE).await.unwrap();

        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].message, "LRT-1 trains will run until 10 PM tonight.");
        assert_eq!(launcher.screenshots().len(), 1);
        assert_eq!(launcher.closed(), 1);
    }

    #[tokio::test]
    async fn test_no_screenshot_without_path() {
        let launcher = Arc::new(
            FakeLauncher::new().with_page(PAGE, FakePage::new(FEED_HTML).with_selectors(&[r#"[role="feed"]"#])),
        );
        scraper(&launcher).scrape(PAGE).await.unwrap();
        assert!(launcher.screenshots().is_empty());
    }

    #[test]
    fn test_page_url_appends_token() {
        assert_eq!(page_url(PAGE, None).unwrap(), PAGE);
        assert_eq!(
            page_url(PAGE, Some("abc 123")).unwrap(),
            "https://www.facebook.com/OfficialLRTA?access_token=abc+123"
        );
        assert!(matches!(page_url("not a url", Some("t")), Err(ScrapeError::Config(_))));
    }
}
