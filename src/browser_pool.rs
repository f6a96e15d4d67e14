use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::types::ViewportSize;
use crate::webdriver::{Browser, BrowserType};

/// Idle browsers older than this are closed instead of reused
pub const MAX_BROWSER_AGE: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub browser_type: BrowserType,
    pub viewport: Option<ViewportSize>,
    pub headless: bool,
    /// Upper bound on browsers alive at once, checked out or idle
    pub max_size: usize,
    pub max_age: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Chrome,
            viewport: None,
            headless: true,
            max_size: 2,
            max_age: MAX_BROWSER_AGE,
        }
    }
}

struct IdleBrowser {
    browser: Browser,
    created_at: Instant,
}

/// Bounded set of reusable browser sessions
pub struct BrowserPool {
    config: PoolConfig,
    idle: Mutex<VecDeque<IdleBrowser>>,
    permits: Arc<Semaphore>,
}

/// A browser checked out of the pool. Hand it back with [`BrowserPool::release`]
/// to keep it for reuse. Dropping a lease frees its slot and discards the browser:
/// once the last `Client` handle is gone the WebDriver session is deleted.
pub struct Lease {
    browser: Browser,
    created_at: Instant,
    _permit: OwnedSemaphorePermit,
}

impl Deref for Lease {
    type Target = Browser;

    fn deref(&self) -> &Browser {
        &self.browser
    }
}

pub fn is_fresh(created_at: Instant, max_age: Duration) -> bool {
    created_at.elapsed() < max_age
}

impl BrowserPool {
    pub fn new(config: PoolConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_size.max(1)));
        Self {
            config,
            idle: Mutex::new(VecDeque::new()),
            permits,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Wait for a slot, then reuse a healthy idle browser or start a new one
    pub async fn acquire(&self) -> Result<Lease> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("Browser pool is closed")?;

        while let Some(idle) = self.pop_idle().await {
            if !is_fresh(idle.created_at, self.config.max_age) {
                debug!("Closing browser idle past its max age");
                let _ = idle.browser.close().await;
                continue;
            }
            match idle.browser.current_url().await {
                Ok(_) => {
                    info!("Reusing pooled browser");
                    return Ok(Lease {
                        browser: idle.browser,
                        created_at: idle.created_at,
                        _permit: permit,
                    });
                }
                Err(e) => {
                    info!("Pooled browser is dead ({}), dropping it", e);
                }
            }
        }

        info!("Starting new {} browser", self.config.browser_type);
        let browser = Browser::new(
            self.config.browser_type,
            self.config.viewport.clone(),
            self.config.headless,
        )
        .await?;

        Ok(Lease {
            browser,
            created_at: Instant::now(),
            _permit: permit,
        })
    }

    async fn pop_idle(&self) -> Option<IdleBrowser> {
        self.idle.lock().await.pop_front()
    }

    /// Reset the browser to a blank page and keep it for the next request
    pub async fn release(&self, lease: Lease) {
        let Lease {
            browser,
            created_at,
            _permit,
        } = lease;

        if !is_fresh(created_at, self.config.max_age) {
            let _ = browser.close().await;
            return;
        }
        if let Err(e) = browser.goto("about:blank").await {
            debug!("Could not reset browser ({}), closing it", e);
            let _ = browser.close().await;
            return;
        }

        let mut idle = self.idle.lock().await;
        idle.push_back(IdleBrowser {
            browser,
            created_at,
        });
        debug!("Returned browser to pool ({} idle)", idle.len());
    }

    /// Close a browser that misbehaved instead of pooling it
    pub async fn discard(&self, lease: Lease) {
        let _ = lease.browser.close().await;
    }

    pub async fn close_all(&self) {
        let mut idle = self.idle.lock().await;
        let count = idle.len();
        while let Some(entry) = idle.pop_front() {
            let _ = entry.browser.close().await;
        }
        info!("Closed {} pooled browser(s)", count);
    }
}
