use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser_pool::{MAX_BROWSER_AGE, PoolConfig};
use crate::prober::ProbeSettings;
use crate::snapshot::DEFAULT_MAX_PER_KIND;
use crate::types::ViewportSize;
use crate::webdriver::BrowserType;

/// Options shared by every command that opens a browser
#[derive(Debug, Clone, Args)]
pub struct BrowserArgs {
    /// Browser to use
    #[arg(long, env = "BUGSIGHT_BROWSER", default_value = "chrome", value_parser = ["firefox", "chrome", "chromium"])]
    pub browser: String,

    /// Show the browser window
    #[arg(long)]
    pub no_headless: bool,

    /// Viewport size (WIDTHxHEIGHT)
    #[arg(long, default_value = "1280x800")]
    pub viewport: String,

    /// Upper bound in milliseconds for each probe or interaction
    #[arg(long, default_value_t = 1000)]
    pub action_timeout_ms: u64,

    /// Wait after navigation before collecting, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,

    /// Maximum elements tested per kind
    #[arg(long, default_value_t = DEFAULT_MAX_PER_KIND)]
    pub max_elements: usize,

    /// Where screenshots are written
    #[arg(long)]
    pub screenshot_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    #[arg(long, env = "BUGSIGHT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "BUGSIGHT_PORT", default_value_t = 3001)]
    pub port: u16,

    /// Browsers kept alive at once
    #[arg(long, default_value_t = 2)]
    pub pool_size: usize,

    #[command(flatten)]
    pub browser: BrowserArgs,
}

/// Resolved settings for the service and one-shot commands
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub pool: PoolConfig,
    pub probe: ProbeSettings,
    pub settle: Duration,
    pub max_elements: usize,
    pub screenshot_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            pool: PoolConfig::default(),
            probe: ProbeSettings::default(),
            settle: Duration::from_millis(1000),
            max_elements: DEFAULT_MAX_PER_KIND,
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// `<cache dir>/bugsight/screenshots`, or the system temp dir without one
pub fn default_screenshot_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bugsight")
        .join("screenshots")
}

impl BrowserArgs {
    pub fn into_config(self, pool_size: usize) -> Result<ServerConfig> {
        let browser_type: BrowserType = self.browser.parse()?;
        let viewport = ViewportSize::parse(&self.viewport)
            .with_context(|| format!("Invalid --viewport {}", self.viewport))?;

        Ok(ServerConfig {
            pool: PoolConfig {
                browser_type,
                viewport: Some(viewport),
                headless: !self.no_headless,
                max_size: pool_size.max(1),
                max_age: MAX_BROWSER_AGE,
            },
            probe: ProbeSettings::with_timeout(Duration::from_millis(self.action_timeout_ms)),
            settle: Duration::from_millis(self.settle_ms),
            max_elements: self.max_elements,
            screenshot_dir: self.screenshot_dir.unwrap_or_else(default_screenshot_dir),
            ..Default::default()
        })
    }
}

impl ServeArgs {
    pub fn into_config(self) -> Result<ServerConfig> {
        Ok(ServerConfig {
            host: self.host,
            port: self.port,
            ..self.browser.into_config(self.pool_size)?
        })
    }
}
