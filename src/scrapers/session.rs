//! Headless browser sessions.
//!
//! The pipeline only talks to a browser through [`BrowserSession`]; the
//! Chromium implementation lives in [`ChromeSession`] and is launched by
//! [`ChromeLauncher`]. Tests substitute a fake session that serves canned
//! documents.
//!
//! Every session is one isolated browser process. Callers own the session for
//! the duration of a single source and must call [`BrowserSession::close`] on
//! every exit path.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, SetLifecycleEventsEnabledParams};
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, ScrapeError};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Upper bound for a page to settle after navigation.
pub const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lifecycle event fired once the frame has had at most two open connections
/// for 500 ms.
const NETWORK_ALMOST_IDLE: &str = "networkAlmostIdle";

/// Resource types that can be refused while a page loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockedResource {
    Image,
    Stylesheet,
    Font,
}

impl BlockedResource {
    fn matches(self, resource: &ResourceType) -> bool {
        matches!(
            (self, resource),
            (BlockedResource::Image, ResourceType::Image)
                | (BlockedResource::Stylesheet, ResourceType::Stylesheet)
                | (BlockedResource::Font, ResourceType::Font)
        )
    }
}

/// How each browser session is configured at launch.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: String,
    /// Requests of these types are aborted. This trades post images for a
    /// much faster settle.
    pub blocked_resources: Vec<BlockedResource>,
    pub navigation_timeout: Duration,
    /// Explicit Chromium binary; auto-detected when `None`.
    pub chrome_executable: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 800,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            blocked_resources: vec![
                BlockedResource::Image,
                BlockedResource::Stylesheet,
                BlockedResource::Font,
            ],
            navigation_timeout: NAVIGATION_TIMEOUT,
            chrome_executable: None,
        }
    }
}

/// Capabilities the scraper needs from an automated browser tab.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Load `url` and wait until the network is almost idle, so that
    /// client-rendered content has had a chance to arrive.
    ///
    /// Fails with [`ScrapeError::NavigationTimeout`] when the page has not
    /// settled within `timeout`, and with [`ScrapeError::Browser`] when the
    /// load itself fails (DNS, refused connection, crashed tab).
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Evaluate a JavaScript expression in the page and return its JSON value.
    /// Promises are awaited.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value>;

    /// Wait until `selector` matches an element. `Ok(false)` on timeout;
    /// browser faults are errors, not misses.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Serialized HTML of the current document.
    async fn content(&self) -> Result<String>;

    /// Write a full-page PNG to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;

    /// Release the browser. Must be called on every exit path.
    async fn close(self: Box<Self>) -> Result<()>;

    async fn scroll_by(&self, distance: u32) -> Result<()> {
        self.evaluate(&format!("window.scrollBy(0, {distance})")).await?;
        Ok(())
    }

    async fn document_height(&self) -> Result<u64> {
        let value = self.evaluate("document.body.scrollHeight").await?;
        value
            .as_u64()
            .or_else(|| value.as_f64().map(|h| h.max(0.0) as u64))
            .ok_or_else(|| ScrapeError::Browser(format!("unexpected scrollHeight value: {value}")))
    }
}

/// Opens fresh browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Start an isolated browser configured per `config`.
    ///
    /// Fails with [`ScrapeError::LaunchFailure`] if the browser cannot start.
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn BrowserSession>>;
}

/// Launches a local headless Chromium per session.
#[derive(Debug, Default, Clone)]
pub struct ChromeLauncher;

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn open(&self, config: &SessionConfig) -> Result<Box<dyn BrowserSession>> {
        Ok(Box::new(ChromeSession::launch(config).await?))
    }
}

pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    interceptor: Option<JoinHandle<()>>,
}

impl ChromeSession {
    #[instrument(level = "info", skip_all)]
    pub async fn launch(config: &SessionConfig) -> Result<Self> {
        info!("Launching browser");
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(config.viewport_width, config.viewport_height)
            .viewport(Viewport {
                width: config.viewport_width,
                height: config.viewport_height,
                ..Viewport::default()
            })
            .args([
                "--disable-setuid-sandbox",
                "--disable-notifications",
                "--disable-dev-shm-usage",
            ]);
        if let Some(exe) = &config.chrome_executable {
            builder = builder.chrome_executable(exe);
        }
        let browser_config = builder.build().map_err(ScrapeError::LaunchFailure)?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::LaunchFailure(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        // From here on a failure must still tear the process down.
        match Self::prepare_page(&browser, config).await {
            Ok((page, interceptor)) => Ok(Self { browser, page, handler, interceptor }),
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler.abort();
                Err(ScrapeError::LaunchFailure(e.to_string()))
            }
        }
    }

    async fn prepare_page(
        browser: &Browser,
        config: &SessionConfig,
    ) -> Result<(Page, Option<JoinHandle<()>>)> {
        let page = browser.new_page("about:blank").await?;
        page.execute(SetUserAgentOverrideParams::new(config.user_agent.clone()))
            .await?;
        page.execute(SetLifecycleEventsEnabledParams::new(true)).await?;

        if config.blocked_resources.is_empty() {
            return Ok((page, None));
        }

        let mut paused = page.event_listener::<EventRequestPaused>().await?;
        let intercept_page = page.clone();
        let blocked = config.blocked_resources.clone();
        let interceptor = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let abort = blocked.iter().any(|b| b.matches(&event.resource_type));
                let outcome = if abort {
                    intercept_page
                        .execute(FailRequestParams::new(request_id, ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                } else {
                    intercept_page
                        .execute(ContinueRequestParams::new(request_id))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!(error = %e, "Could not resolve paused request");
                }
            }
        });
        page.execute(EnableParams::default()).await?;

        Ok((page, Some(interceptor)))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    #[instrument(level = "info", skip(self, timeout), fields(timeout_ms = timeout.as_millis() as u64))]
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let settle = async {
            // Subscribe first so events fired while `goto` runs are buffered.
            let mut lifecycle = self.page.event_listener::<EventLifecycleEvent>().await?;
            let main_frame = self.page.mainframe().await?;
            self.page.goto(url).await?;

            // Only the loader started by this navigation counts; idle events
            // left over from the previous document are ignored.
            let mut loader = None;
            while let Some(event) = lifecycle.next().await {
                if main_frame.as_ref().is_some_and(|frame| *frame != event.frame_id) {
                    continue;
                }
                match event.name.as_str() {
                    "init" => loader = Some(event.loader_id.clone()),
                    NETWORK_ALMOST_IDLE if loader.as_ref() == Some(&event.loader_id) => {
                        debug!("Network almost idle");
                        return Ok(());
                    }
                    _ => {}
                }
            }
            Err::<(), _>(ScrapeError::Browser(
                "page closed before the network went idle".to_string(),
            ))
        };
        match tokio::time::timeout(timeout, settle).await {
            Ok(result) => result,
            Err(_) => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(expression).await?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let probe = selector_probe_expression(selector);
        let started = Instant::now();
        loop {
            if self.evaluate(&probe).await?.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn content(&self) -> Result<String> {
        Ok(self.page.content().await?)
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromeSession { mut browser, page: _, handler, interceptor } = *self;
        let closed = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        if let Some(task) = interceptor {
            task.abort();
        }
        handler.abort();
        closed?;
        info!("Browser closed");
        Ok(())
    }
}

/// JavaScript that is `true` once `selector` matches an element.
///
/// A query that matches nothing is a miss; a broken session surfaces as an
/// evaluation error instead.
fn selector_probe_expression(selector: &str) -> String {
    let literal = serde_json::Value::String(selector.to_string());
    format!("document.querySelector({literal}) !== null")
}
