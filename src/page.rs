//! The live page seam used by the resolver, classifier and prober.
//!
//! Production code drives a WebDriver session through [`crate::webdriver::Browser`];
//! tests drive an in-memory page parsed from an HTML fixture.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::types::{BoundingBox, ElementKind};

/// A single-element lookup understood by every page backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Plain CSS selector
    Css(String),
    /// First element of `kind` whose rendered text (or button value) contains `text`, case-insensitive
    Text { kind: ElementKind, text: String },
    /// First element with an explicit ARIA `role` whose accessible name contains `name`
    Role { role: String, name: String },
    /// First `<label>` whose text contains the given string
    Label(String),
}

impl Query {
    pub fn css(selector: impl Into<String>) -> Self {
        Query::Css(selector.into())
    }

    /// Human readable form, reported back as the selector that matched
    pub fn describe(&self) -> String {
        match self {
            Query::Css(selector) => selector.clone(),
            Query::Text { kind, text } => format!("{}:has-text(\"{}\")", kind, text),
            Query::Role { role, name } => format!("role={}[name=\"{}\"]", role, name),
            Query::Label(text) => format!("label:has-text(\"{}\")", text),
        }
    }
}

/// Choice passed to [`LivePage::select_option`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    Value(String),
    Text(String),
}

/// A rendered page that elements can be located in and exercised on.
///
/// All methods may fail; callers in this crate treat every failure as a
/// negative answer for that one element.
#[async_trait]
pub trait LivePage: Send + Sync {
    /// Reference to an element in the rendered page
    type Handle: Clone + Send + Sync;

    /// First element matching `query`, `None` when nothing matches
    async fn query(&self, query: &Query) -> Result<Option<Self::Handle>>;

    /// Every element matching a CSS selector, in document order
    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Handle>>;

    /// First descendant of `parent` matching a CSS selector
    async fn query_within(
        &self,
        parent: &Self::Handle,
        selector: &str,
    ) -> Result<Option<Self::Handle>>;

    async fn is_visible(&self, element: &Self::Handle) -> Result<bool>;

    async fn is_enabled(&self, element: &Self::Handle) -> Result<bool>;

    /// `None` when the element is not rendered
    async fn bounding_box(&self, element: &Self::Handle) -> Result<Option<BoundingBox>>;

    async fn attribute(&self, element: &Self::Handle, name: &str) -> Result<Option<String>>;

    /// Rendered text content
    async fn text(&self, element: &Self::Handle) -> Result<String>;

    /// Current value of a form control
    async fn input_value(&self, element: &Self::Handle) -> Result<String>;

    /// Replace the value of a form control
    async fn fill(&self, element: &Self::Handle, value: &str) -> Result<()>;

    async fn select_option(&self, element: &Self::Handle, choice: &OptionChoice) -> Result<()>;

    async fn click(&self, element: &Self::Handle) -> Result<()>;

    async fn is_checked(&self, element: &Self::Handle) -> Result<bool>;
}

/// Await `action`, failing once `limit` has elapsed
pub async fn within<T>(limit: Duration, action: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, action).await {
        Ok(result) => result,
        Err(_) => bail!("Timeout {}ms exceeded", limit.as_millis()),
    }
}
