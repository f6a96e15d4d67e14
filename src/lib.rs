//! # bugsight
#![allow(clippy::uninlined_format_args)]
//!
//! Loads a web page in a real browser, finds its interactive elements and
//! checks that each one can actually be used. A second flow collects console
//! errors, failed requests, markup and a screenshot and asks an
//! OpenAI-compatible model for bugs and fixes.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Run the HTTP service on 127.0.0.1:3001
//! bugsight serve
//!
//! # Probe every button, input, dropdown and checkbox on a page
//! bugsight scan "https://example.com/signup"
//! bugsight scan "https://example.com/signup" --format simple --browser firefox
//!
//! # Ask the model about a page (needs BUGSIGHT_LLM_API_KEY or OPENAI_API_KEY)
//! bugsight analyze "https://example.com"
//! ```
//!
//! ## HTTP API
//!
//! ```bash
//! curl localhost:3001/health
//! curl "localhost:3001/api/scan?url=https://example.com"
//! curl "localhost:3001/api/analyze-url?url=https://example.com"
//! curl -N "localhost:3001/api/analyze-url-stream?url=https://example.com"
//! ```
//!
//! ## Library Usage
//!
//! Element testing runs against anything implementing [`page::LivePage`];
//! [`webdriver::Browser`] is the WebDriver-backed implementation.
//!
//! ```no_run
//! use bugsight::{Browser, BrowserType, ProbeSettings, snapshot, test_snapshot};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let browser = Browser::new(BrowserType::Chrome, None, true).await?;
//! browser.goto("https://example.com").await?;
//!
//! let descriptors = snapshot::extract(&browser.source().await?, 50)?;
//! let reports = test_snapshot(&browser, &descriptors, &ProbeSettings::default()).await;
//! for report in reports.iter() {
//!     println!("{:?} -> {:?}", report.descriptor.kind, report.test_results.strategy_used);
//! }
//! browser.close().await?;
//! # Ok(())
//! # }
//! ```

/// Runs resolution, classification and probing over a whole snapshot
pub mod aggregator;
pub mod classifier;
pub mod page;
pub mod prober;
pub mod resolver;

/// Descriptor extraction from serialized HTML
pub mod snapshot;

/// Type definitions for descriptors and test results
pub mod types;

/// WebDriver browser control and automation
pub mod webdriver;

/// Automatic WebDriver process management
pub mod webdriver_manager;

pub mod browser_pool;
pub mod capture;
pub mod config;
pub mod errors;
pub mod llm;
pub mod pipeline;
pub mod server;

#[cfg(test)]
mod fake_page;

pub use aggregator::{test_element, test_snapshot};
pub use prober::ProbeSettings;
pub use resolver::{ResolutionResult, Strategy, resolve};
pub use types::{
    DomAnalysis, ElementDescriptor, ElementKind, ElementReport, OutputFormat, TestOutcome,
    ViewportSize,
};
pub use webdriver::{Browser, BrowserType, ConsoleMessage};
