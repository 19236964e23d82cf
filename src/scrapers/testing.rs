//! In-process browser doubles for tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Result, ScrapeError};
use crate::scrapers::session::{BrowserSession, SessionConfig, SessionLauncher};

/// How `document.body.scrollHeight` evolves across measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    Fixed(u64),
    /// `start + step * n` on the n-th measurement.
    Growing { start: u64, step: u64 },
}

#[derive(Debug, Clone)]
pub struct FakePage {
    html: String,
    selectors: Vec<String>,
    growth: Growth,
    navigation_fault: Option<String>,
    probe_fault: Option<String>,
    screenshot_fault: Option<String>,
}

impl FakePage {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            selectors: Vec::new(),
            growth: Growth::Fixed(1_000),
            navigation_fault: None,
            probe_fault: None,
            screenshot_fault: None,
        }
    }

    pub fn with_selectors(mut self, selectors: &[&str]) -> Self {
        self.selectors = selectors.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_growth(mut self, growth: Growth) -> Self {
        self.growth = growth;
        self
    }

    /// Navigating here fails with [`ScrapeError::Browser`].
    pub fn with_navigation_fault(mut self, reason: &str) -> Self {
        self.navigation_fault = Some(reason.to_string());
        self
    }

    /// Every selector wait fails with [`ScrapeError::Browser`].
    pub fn with_probe_fault(mut self, reason: &str) -> Self {
        self.probe_fault = Some(reason.to_string());
        self
    }

    /// Screenshots fail with [`ScrapeError::Browser`].
    pub fn with_screenshot_fault(mut self, reason: &str) -> Self {
        self.screenshot_fault = Some(reason.to_string());
        self
    }
}

/// A screenshot request as seen by the fake, with the number of scroll steps
/// taken before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotCall {
    pub path: PathBuf,
    pub scrolls_before: u32,
}

pub struct FakeSession {
    pages: Arc<HashMap<String, FakePage>>,
    current: Mutex<FakePage>,
    probed: Mutex<Vec<String>>,
    screenshots: Arc<Mutex<Vec<ScreenshotCall>>>,
    measurements: AtomicU32,
    scrolls: AtomicU32,
    closed: Arc<AtomicUsize>,
}

impl FakeSession {
    /// A session already showing `html`.
    pub fn new(html: &str) -> Self {
        Self::from_parts(
            Arc::new(HashMap::new()),
            FakePage::new(html),
            Arc::new(AtomicUsize::new(0)),
            Arc::new(Mutex::new(Vec::new())),
        )
    }

    fn from_parts(
        pages: Arc<HashMap<String, FakePage>>,
        current: FakePage,
        closed: Arc<AtomicUsize>,
        screenshots: Arc<Mutex<Vec<ScreenshotCall>>>,
    ) -> Self {
        Self {
            pages,
            current: Mutex::new(current),
            probed: Mutex::new(Vec::new()),
            screenshots,
            measurements: AtomicU32::new(0),
            scrolls: AtomicU32::new(0),
            closed,
        }
    }

    fn map_page(self, f: impl FnOnce(FakePage) -> FakePage) -> Self {
        let page = f(self.current.lock().unwrap().clone());
        *self.current.lock().unwrap() = page;
        self
    }

    pub fn with_selectors(self, selectors: &[&str]) -> Self {
        self.map_page(|p| p.with_selectors(selectors))
    }

    pub fn with_growth(self, growth: Growth) -> Self {
        self.map_page(|p| p.with_growth(growth))
    }

    pub fn with_probe_fault(self, reason: &str) -> Self {
        self.map_page(|p| p.with_probe_fault(reason))
    }

    /// Selectors waited on, in order.
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub fn scroll_calls(&self) -> u32 {
        self.scrolls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let key = url.split('?').next().unwrap_or(url);
        match self.pages.get(key) {
            Some(page) => {
                if let Some(reason) = &page.navigation_fault {
                    return Err(ScrapeError::Browser(format!("{reason} at {url}")));
                }
                *self.current.lock().unwrap() = page.clone();
                self.measurements.store(0, Ordering::SeqCst);
                Ok(())
            }
            None => Err(ScrapeError::NavigationTimeout {
                url: url.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn evaluate(&self, _expression: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn wait_for_selector(&self, selector: &str, _timeout: Duration) -> Result<bool> {
        self.probed.lock().unwrap().push(selector.to_string());
        let page = self.current.lock().unwrap();
        if let Some(reason) = &page.probe_fault {
            return Err(ScrapeError::Browser(reason.clone()));
        }
        Ok(page.selectors.iter().any(|s| s == selector))
    }

    async fn content(&self) -> Result<String> {
        Ok(self.current.lock().unwrap().html.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.screenshots.lock().unwrap().push(ScreenshotCall {
            path: path.to_path_buf(),
            scrolls_before: self.scrolls.load(Ordering::SeqCst),
        });
        match &self.current.lock().unwrap().screenshot_fault {
            Some(reason) => Err(ScrapeError::Browser(reason.clone())),
            None => Ok(()),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn scroll_by(&self, _distance: u32) -> Result<()> {
        self.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn document_height(&self) -> Result<u64> {
        let n = u64::from(self.measurements.fetch_add(1, Ordering::SeqCst));
        Ok(match self.current.lock().unwrap().growth {
            Growth::Fixed(height) => height,
            Growth::Growing { start, step } => start + step * n,
        })
    }
}

/// Hands out [`FakeSession`]s that serve pages keyed by URL (query string
/// ignored). Unknown URLs time out on navigation.
#[derive(Default)]
pub struct FakeLauncher {
    pages: HashMap<String, FakePage>,
    fail_launch: bool,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    screenshots: Arc<Mutex<Vec<ScreenshotCall>>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Every `open` fails with [`ScrapeError::LaunchFailure`].
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Screenshot requests across every session handed out.
    pub fn screenshots(&self) -> Vec<ScreenshotCall> {
        self.screenshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn open(&self, _config: &SessionConfig) -> Result<Box<dyn BrowserSession>> {
        if self.fail_launch {
            return Err(ScrapeError::LaunchFailure("no browser available".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession::from_parts(
            Arc::new(self.pages.clone()),
            FakePage::new("<html></html>"),
            Arc::clone(&self.closed),
            Arc::clone(&self.screenshots),
        )))
    }
}
