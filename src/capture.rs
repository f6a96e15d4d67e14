use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::webdriver::{Browser, ConsoleMessage, NetworkError};

/// Everything collected from one page load
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBundle {
    pub url: String,
    pub title: String,
    #[serde(skip)]
    pub html: String,
    pub console_errors: Vec<ConsoleMessage>,
    pub network_errors: Vec<NetworkError>,
    #[serde(skip)]
    pub screenshot_png: Vec<u8>,
}

/// Navigate, let the page settle, then read errors, markup and a screenshot.
///
/// Only navigation failures are errors. A page whose screenshot or source
/// cannot be read still yields a bundle with those parts empty.
pub async fn collect(browser: &Browser, url: &str, settle: Duration) -> Result<PageBundle> {
    browser.goto(url).await?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }

    let (console_errors, network_errors) =
        tokio::join!(browser.console_errors(), browser.network_errors());

    let title = browser.title().await.unwrap_or_else(|e| {
        debug!("Could not read title: {}", e);
        String::new()
    });
    let html = browser.source().await.unwrap_or_else(|e| {
        debug!("Could not read page source: {}", e);
        String::new()
    });
    let screenshot_png = browser.screenshot().await.unwrap_or_else(|e| {
        debug!("Could not take screenshot: {}", e);
        Vec::new()
    });
    let final_url = browser
        .current_url()
        .await
        .unwrap_or_else(|_| url.to_string());

    info!(
        "Collected {}: {} console error(s), {} network error(s)",
        final_url,
        console_errors.len(),
        network_errors.len()
    );

    Ok(PageBundle {
        url: final_url,
        title,
        html,
        console_errors,
        network_errors,
        screenshot_png,
    })
}

/// Write `png` as `<dir>/<uuid>.png` and return the file name
pub fn save_screenshot(dir: &Path, png: &[u8]) -> Result<String> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create screenshot directory {}", dir.display()))?;
    let name = format!("{}.png", Uuid::new_v4());
    let path: PathBuf = dir.join(&name);
    std::fs::write(&path, png)
        .with_context(|| format!("Failed to write screenshot {}", path.display()))?;
    debug!("Saved screenshot to {}", path.display());
    Ok(name)
}
