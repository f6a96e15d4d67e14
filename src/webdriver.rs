use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::page::{LivePage, OptionChoice, Query};
use crate::types::{BoundingBox, ElementKind, ViewportSize};
use crate::webdriver_manager::GLOBAL_DRIVER_MANAGER;

const READY_POLLS: u32 = 20;
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A WebDriver session driving one browser window
pub struct Browser {
    client: Client,
    browser_type: BrowserType,
    console_logs: Arc<Mutex<Vec<ConsoleMessage>>>,
    _profile_dir: tempfile::TempDir,
}

/// Console message captured from the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsoleMessage {
    /// log, info, warn or error
    pub level: String,
    pub message: String,
    /// ISO-8601 time the page logged it
    pub timestamp: String,
}

impl ConsoleMessage {
    pub fn is_error(&self) -> bool {
        self.level == "error"
    }
}

/// A failed request seen by the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkError {
    pub url: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub method: Option<String>,
    /// fetch, xhr, or the resource initiator (script, img, css, ...)
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Firefox,
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl std::fmt::Display for BrowserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BrowserType::Firefox => "firefox",
            BrowserType::Chrome => "chrome",
        })
    }
}

impl BrowserType {
    pub fn driver_name(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            BrowserType::Firefox => 4444,
            BrowserType::Chrome => 9515,
        }
    }
}

/// Session capabilities for a fresh browser
pub fn capabilities(
    browser_type: BrowserType,
    viewport: Option<&ViewportSize>,
    headless: bool,
    profile_dir: &Path,
) -> serde_json::Map<String, serde_json::Value> {
    let mut caps = serde_json::Map::new();
    match browser_type {
        BrowserType::Firefox => {
            let mut args = Vec::new();
            if headless {
                args.push("--headless".to_string());
            }
            if let Some(vp) = viewport {
                args.push(format!("--width={}", vp.width));
                args.push(format!("--height={}", vp.height));
            }
            args.push("-profile".to_string());
            args.push(profile_dir.display().to_string());
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
        BrowserType::Chrome => {
            let mut args = vec!["--no-sandbox".to_string()];
            if headless {
                args.push("--headless=new".to_string());
                args.push("--disable-gpu".to_string());
                args.push("--disable-dev-shm-usage".to_string());
            }
            if let Some(vp) = viewport {
                args.push(format!("--window-size={},{}", vp.width, vp.height));
            }
            args.push(format!("--user-data-dir={}", profile_dir.display()));
            caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

/// Installs console and network hooks in the current document. Idempotent.
const CAPTURE_SCRIPT: &str = r#"
(function() {
    if (window.__bugsight_capture) return;
    window.__bugsight_capture = true;
    window.__bugsight_console = [];
    window.__bugsight_network = [];

    function push(list, entry) {
        list.push(entry);
        if (list.length > 1000) list.shift();
    }

    function render(args) {
        return Array.from(args).map(function(arg) {
            if (arg instanceof Error) return arg.stack || String(arg);
            if (typeof arg === 'object') {
                try { return JSON.stringify(arg); } catch (e) { return String(arg); }
            }
            return String(arg);
        }).join(' ');
    }

    ['log', 'info', 'warn', 'error'].forEach(function(level) {
        const original = console[level];
        console[level] = function() {
            push(window.__bugsight_console, {
                level: level,
                message: render(arguments),
                timestamp: new Date().toISOString()
            });
            return original.apply(console, arguments);
        };
    });

    window.addEventListener('error', function(event) {
        const target = event.target;
        if (target && target !== window && (target.src || target.href)) {
            push(window.__bugsight_network, {
                url: target.src || target.href,
                status: null,
                method: 'GET',
                kind: (target.tagName || 'resource').toLowerCase(),
                message: 'Failed to load resource'
            });
            return;
        }
        push(window.__bugsight_console, {
            level: 'error',
            message: 'Uncaught ' + (event.error || event.message) + ' at ' +
                event.filename + ':' + event.lineno + ':' + event.colno,
            timestamp: new Date().toISOString()
        });
    }, true);

    window.addEventListener('unhandledrejection', function(event) {
        push(window.__bugsight_console, {
            level: 'error',
            message: 'Unhandled Promise Rejection: ' + event.reason,
            timestamp: new Date().toISOString()
        });
    });

    if (window.fetch) {
        const originalFetch = window.fetch;
        window.fetch = function(input, init) {
            const url = typeof input === 'string' ? input : (input && input.url) || String(input);
            const method = ((init && init.method) || (input && input.method) || 'GET').toUpperCase();
            return originalFetch.apply(this, arguments).then(function(response) {
                if (response.status >= 400) {
                    push(window.__bugsight_network, {
                        url: response.url || url, status: response.status, method: method,
                        kind: 'fetch', message: response.status + ' ' + response.statusText
                    });
                }
                return response;
            }, function(error) {
                push(window.__bugsight_network, {
                    url: url, status: null, method: method, kind: 'fetch', message: String(error)
                });
                throw error;
            });
        };
    }

    const open = XMLHttpRequest.prototype.open;
    const send = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.open = function(method, url) {
        this.__bugsight = { method: String(method).toUpperCase(), url: String(url) };
        return open.apply(this, arguments);
    };
    XMLHttpRequest.prototype.send = function() {
        const xhr = this;
        xhr.addEventListener('loadend', function() {
            const info = xhr.__bugsight || { method: 'GET', url: '' };
            if (xhr.status === 0 || xhr.status >= 400) {
                push(window.__bugsight_network, {
                    url: xhr.responseURL || info.url,
                    status: xhr.status || null,
                    method: info.method,
                    kind: 'xhr',
                    message: xhr.status ? xhr.status + ' ' + xhr.statusText : 'Network error'
                });
            }
        });
        return send.apply(this, arguments);
    };
})();
"#;

/// Hooked failures plus resource timings that report an error status
const NETWORK_SCRIPT: &str = r#"
const seen = window.__bugsight_network || [];
const entries = performance.getEntriesByType('navigation')
    .concat(performance.getEntriesByType('resource'));
const failed = entries
    .filter(function(e) { return typeof e.responseStatus === 'number' && e.responseStatus >= 400; })
    .filter(function(e) { return !seen.some(function(s) { return s.url === e.name; }); })
    .map(function(e) {
        return {
            url: e.name, status: e.responseStatus, method: null,
            kind: e.initiatorType || 'navigation', message: 'HTTP ' + e.responseStatus
        };
    });
return seen.concat(failed);
"#;

const XPATH_UPPER: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const XPATH_LOWER: &str = "abcdefghijklmnopqrstuvwxyz";

/// Quote `value` as an XPath 1.0 string literal
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    if !value.contains('"') {
        return format!("\"{}\"", value);
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{}'", part))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn contains_ignore_case(expr: &str, needle: &str) -> String {
    format!(
        "contains(translate({}, '{}', '{}'), {})",
        expr,
        XPATH_UPPER,
        XPATH_LOWER,
        xpath_literal(&needle.to_lowercase())
    )
}

/// Union of node sets matching every live element of `kind`
pub fn kind_xpath(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Button => {
            "//button | //input[@type='button' or @type='submit' or @type='reset']"
        }
        ElementKind::Input => {
            "//input[not(@type='checkbox' or @type='radio' or @type='button' or @type='submit' or @type='reset' or @type='hidden' or @type='image' or @type='file')] | //textarea"
        }
        ElementKind::Select => "//select",
        ElementKind::Checkbox => "//input[@type='checkbox']",
    }
}

pub fn text_xpath(kind: ElementKind, text: &str) -> String {
    format!(
        "({})[{} or {}]",
        kind_xpath(kind),
        contains_ignore_case("normalize-space(.)", text),
        contains_ignore_case("@value", text)
    )
}

pub fn role_xpath(role: &str, name: &str) -> String {
    let explicit = format!("//*[@role={}]", xpath_literal(role));
    let nodes = if role == "button" {
        format!("{} | {}", explicit, kind_xpath(ElementKind::Button))
    } else {
        explicit
    };
    format!(
        "({})[{} or {} or {}]",
        nodes,
        contains_ignore_case("@aria-label", name),
        contains_ignore_case("normalize-space(.)", name),
        contains_ignore_case("@value", name)
    )
}

pub fn label_xpath(text: &str) -> String {
    format!(
        "//label[{}]",
        contains_ignore_case("normalize-space(.)", text)
    )
}

impl Browser {
    /// Start a session, launching the driver if none is running
    pub async fn new(
        browser_type: BrowserType,
        viewport: Option<ViewportSize>,
        headless: bool,
    ) -> Result<Self> {
        info!("Connecting to {} WebDriver", browser_type);
        let webdriver_url = GLOBAL_DRIVER_MANAGER.ensure_driver(browser_type).await?;

        let profile_dir = tempfile::Builder::new()
            .prefix(&format!("bugsight-{}-", browser_type))
            .tempdir()
            .context("Failed to create browser profile directory")?;
        let caps = capabilities(browser_type, viewport.as_ref(), headless, profile_dir.path());

        debug!("Connecting to WebDriver at {}", webdriver_url);
        let client = match ClientBuilder::rustls()
            .capabilities(caps.clone())
            .connect(&webdriver_url)
            .await
        {
            Ok(client) => client,
            Err(e)
                if e.to_string().contains("session not created")
                    || e.to_string().contains("Session is already started") =>
            {
                warn!("WebDriver refused a new session ({}), restarting it", e);
                GLOBAL_DRIVER_MANAGER.stop_driver(browser_type);
                tokio::time::sleep(Duration::from_millis(500)).await;
                let url = GLOBAL_DRIVER_MANAGER
                    .ensure_driver(browser_type)
                    .await
                    .context("Failed to restart WebDriver")?;
                ClientBuilder::rustls()
                    .capabilities(caps)
                    .connect(&url)
                    .await
                    .context("Failed to connect to WebDriver after restart")?
            }
            Err(e) => return Err(e).context("Failed to connect to WebDriver"),
        };

        if let Some(vp) = viewport
            && let Err(e) = client.set_window_size(vp.width, vp.height).await
        {
            debug!("Could not set window size: {}", e);
        }

        Ok(Browser {
            client,
            browser_type,
            console_logs: Arc::new(Mutex::new(Vec::new())),
            _profile_dir: profile_dir,
        })
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    async fn install_capture(&self) {
        if let Err(e) = self.client.execute(CAPTURE_SCRIPT, vec![]).await {
            debug!("Could not install page capture: {}", e);
        }
    }

    /// Navigate, wait for `document.readyState == "complete"` and hook the page
    pub async fn goto(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.console_logs.lock().await.clear();
        self.client
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {} failed", url))?;

        for _ in 0..READY_POLLS {
            match self
                .client
                .execute("return document.readyState === 'complete';", vec![])
                .await
            {
                Ok(ready) if ready.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(READY_POLL_INTERVAL).await,
            }
        }

        self.install_capture().await;
        Ok(())
    }

    /// Console messages logged since the last navigation
    pub async fn console_logs(&self) -> Vec<ConsoleMessage> {
        let script = "return window.__bugsight_console || [];";
        let mut stored = self.console_logs.lock().await;
        match self.client.execute(script, vec![]).await {
            Ok(value) => match serde_json::from_value::<Vec<ConsoleMessage>>(value) {
                Ok(logs) => *stored = logs,
                Err(e) => debug!("Unreadable console buffer: {}", e),
            },
            Err(e) => debug!("Could not read console buffer: {}", e),
        }
        stored.clone()
    }

    pub async fn console_errors(&self) -> Vec<ConsoleMessage> {
        self.console_logs()
            .await
            .into_iter()
            .filter(ConsoleMessage::is_error)
            .collect()
    }

    pub async fn network_errors(&self) -> Vec<NetworkError> {
        match self.client.execute(NETWORK_SCRIPT, vec![]).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                debug!("Unreadable network buffer: {}", e);
                Vec::new()
            }),
            Err(e) => {
                debug!("Could not read network buffer: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.client.current_url().await?.to_string())
    }

    pub async fn title(&self) -> Result<String> {
        Ok(self.client.title().await?)
    }

    /// Serialized DOM of the current document
    pub async fn source(&self) -> Result<String> {
        Ok(self.client.source().await?)
    }

    /// PNG of the current viewport
    pub async fn screenshot(&self) -> Result<Vec<u8>> {
        Ok(self.client.screenshot().await?)
    }

    pub async fn execute(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        Ok(self.client.execute(script, args).await?)
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn first(mut elements: Vec<Element>) -> Option<Element> {
    if elements.is_empty() {
        None
    } else {
        Some(elements.swap_remove(0))
    }
}

#[async_trait]
impl LivePage for Browser {
    type Handle = Element;

    async fn query(&self, query: &Query) -> Result<Option<Element>> {
        let found = match query {
            Query::Css(selector) => self.client.find_all(Locator::Css(selector)).await?,
            Query::Text { kind, text } => {
                self.client
                    .find_all(Locator::XPath(&text_xpath(*kind, text)))
                    .await?
            }
            Query::Role { role, name } => {
                self.client
                    .find_all(Locator::XPath(&role_xpath(role, name)))
                    .await?
            }
            Query::Label(text) => {
                self.client
                    .find_all(Locator::XPath(&label_xpath(text)))
                    .await?
            }
        };
        Ok(first(found))
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Element>> {
        Ok(self.client.find_all(Locator::Css(selector)).await?)
    }

    async fn query_within(&self, parent: &Element, selector: &str) -> Result<Option<Element>> {
        Ok(first(parent.find_all(Locator::Css(selector)).await?))
    }

    async fn is_visible(&self, element: &Element) -> Result<bool> {
        Ok(element.is_displayed().await?)
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool> {
        Ok(element.is_enabled().await?)
    }

    async fn bounding_box(&self, element: &Element) -> Result<Option<BoundingBox>> {
        let (x, y, width, height) = element.rectangle().await?;
        Ok(Some(BoundingBox {
            x,
            y,
            width,
            height,
        }))
    }

    async fn attribute(&self, element: &Element, name: &str) -> Result<Option<String>> {
        Ok(element.attr(name).await?)
    }

    async fn text(&self, element: &Element) -> Result<String> {
        Ok(element.text().await?)
    }

    async fn input_value(&self, element: &Element) -> Result<String> {
        Ok(element.prop("value").await?.unwrap_or_default())
    }

    async fn fill(&self, element: &Element, value: &str) -> Result<()> {
        element.clear().await?;
        if !value.is_empty() {
            element.send_keys(value).await?;
        }
        Ok(())
    }

    async fn select_option(&self, element: &Element, choice: &OptionChoice) -> Result<()> {
        match choice {
            OptionChoice::Value(value) => element.select_by_value(value).await?,
            OptionChoice::Text(text) => element.select_by_label(text).await?,
        }
        Ok(())
    }

    async fn click(&self, element: &Element) -> Result<()> {
        element.click().await?;
        Ok(())
    }

    async fn is_checked(&self, element: &Element) -> Result<bool> {
        Ok(element.is_selected().await?)
    }
}

#[cfg(test)]
#[path = "webdriver_test.rs"]
mod webdriver_test;
