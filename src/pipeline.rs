//! End-to-end flows shared by the HTTP handlers and the one-shot commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregator::test_snapshot;
use crate::capture::{self, PageBundle};
use crate::config::ServerConfig;
use crate::llm::{LlmClient, Verdict};
use crate::snapshot;
use crate::types::{DomAnalysis, ScanSummary};
use crate::webdriver::{Browser, ConsoleMessage, NetworkError};

/// Response of the LLM analysis endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlAnalysis {
    pub url: String,
    pub title: String,
    pub analyzed_at: DateTime<Utc>,
    /// Screenshot file name under the screenshot directory
    pub screenshot: Option<String>,
    pub console_errors: Vec<ConsoleMessage>,
    pub network_errors: Vec<NetworkError>,
    pub analysis: Verdict,
}

/// Load `url`, extract its interactive elements and exercise each of them
pub async fn scan(browser: &Browser, url: &str, config: &ServerConfig) -> Result<DomAnalysis> {
    browser.goto(url).await?;
    if !config.settle.is_zero() {
        tokio::time::sleep(config.settle).await;
    }

    let html = browser.source().await?;
    let descriptors = snapshot::extract(&html, config.max_elements)?;
    info!("Testing {} element(s) on {}", descriptors.total(), url);

    let elements = test_snapshot(browser, &descriptors, &config.probe).await;
    let summary = ScanSummary::from_reports(&elements);
    info!(
        "Scan done: {} found, {} interactive of {}",
        summary.found, summary.interactive, summary.total
    );

    let title = browser.title().await.unwrap_or_default();
    let final_url = browser
        .current_url()
        .await
        .unwrap_or_else(|_| url.to_string());

    Ok(DomAnalysis {
        url: final_url,
        title,
        analyzed_at: Utc::now(),
        elements,
        summary,
        console_errors: browser.console_errors().await,
    })
}

/// Store the bundle's screenshot, if any; a failed write only loses the file
pub fn store_screenshot(bundle: &PageBundle, config: &ServerConfig) -> Option<String> {
    if bundle.screenshot_png.is_empty() {
        return None;
    }
    match capture::save_screenshot(&config.screenshot_dir, &bundle.screenshot_png) {
        Ok(name) => Some(name),
        Err(e) => {
            warn!("{:#}", e);
            None
        }
    }
}

pub fn assemble(bundle: PageBundle, screenshot: Option<String>, analysis: Verdict) -> UrlAnalysis {
    UrlAnalysis {
        url: bundle.url,
        title: bundle.title,
        analyzed_at: Utc::now(),
        screenshot,
        console_errors: bundle.console_errors,
        network_errors: bundle.network_errors,
        analysis,
    }
}

/// Collect a bundle for `url` and ask the model about it
pub async fn analyze(
    browser: &Browser,
    llm: &LlmClient,
    url: &str,
    config: &ServerConfig,
) -> Result<UrlAnalysis> {
    let bundle = capture::collect(browser, url, config.settle).await?;
    let screenshot = store_screenshot(&bundle, config);
    let verdict = llm.analyze(&bundle).await;
    Ok(assemble(bundle, screenshot, verdict))
}
