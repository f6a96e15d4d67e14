//! Ordered fallback chain that locates the live element behind a descriptor.
//!
//! Strategies run strictly in order and the first hit wins. A strategy that
//! errors (invalid selector, driver hiccup) is logged and skipped; running out
//! of strategies is an ordinary "not found".

pub mod selectors;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::page::{LivePage, Query};
use crate::types::{ElementDescriptor, ElementKind};
use selectors::{
    class_query, data_attribute_queries, escape_id, id_query, kind_selector, label_text,
    name_query, placeholder_query, role_query, text_query,
};

/// The individual lookup heuristics, strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Id,
    Name,
    Text,
    /// Accessible-role fallback of the text strategy
    Role,
    Placeholder,
    DataAttribute,
    Class,
    Label,
    TypeMatch,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Id => "id",
            Strategy::Name => "name",
            Strategy::Text => "text",
            Strategy::Role => "role",
            Strategy::Placeholder => "placeholder",
            Strategy::DataAttribute => "data-attribute",
            Strategy::Class => "class",
            Strategy::Label => "label",
            Strategy::TypeMatch => "type-match",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful lookup
#[derive(Debug, Clone)]
pub struct Resolved<H> {
    pub handle: H,
    pub strategy: Strategy,
    /// Selector or lookup description that matched
    pub selector: String,
}

/// Output of the chain: a handle and its strategy, or neither
#[derive(Debug, Clone)]
pub struct ResolutionResult<H> {
    found: Option<Resolved<H>>,
}

impl<H> ResolutionResult<H> {
    pub fn not_found() -> Self {
        Self { found: None }
    }

    fn found(handle: H, strategy: Strategy, selector: String) -> Self {
        Self {
            found: Some(Resolved {
                handle,
                strategy,
                selector,
            }),
        }
    }

    pub fn found_handle(&self) -> Option<&H> {
        self.found.as_ref().map(|r| &r.handle)
    }

    pub fn strategy_used(&self) -> Option<Strategy> {
        self.found.as_ref().map(|r| r.strategy)
    }

    pub fn selector(&self) -> Option<&str> {
        self.found.as_ref().map(|r| r.selector.as_str())
    }

    pub fn into_resolved(self) -> Option<Resolved<H>> {
        self.found
    }
}

/// Run a single query as one strategy step; errors count as a miss
async fn attempt<P: LivePage + ?Sized>(
    page: &P,
    strategy: Strategy,
    query: Option<Query>,
) -> Option<ResolutionResult<P::Handle>> {
    let query = query?;
    match page.query(&query).await {
        Ok(Some(handle)) => Some(ResolutionResult::found(handle, strategy, query.describe())),
        Ok(None) => None,
        Err(e) => {
            debug!("Strategy {} failed for {}: {}", strategy, query.describe(), e);
            None
        }
    }
}

/// Locate the live element for `descriptor`, trying each strategy in order
pub async fn resolve<P: LivePage + ?Sized>(
    page: &P,
    descriptor: &ElementDescriptor,
) -> ResolutionResult<P::Handle> {
    if let Some(hit) = attempt(page, Strategy::Id, id_query(descriptor)).await {
        return hit;
    }
    if let Some(hit) = attempt(page, Strategy::Name, name_query(descriptor)).await {
        return hit;
    }

    if let Some(query) = text_query(descriptor) {
        match page.query(&query).await {
            Ok(Some(handle)) => {
                return ResolutionResult::found(handle, Strategy::Text, query.describe());
            }
            Ok(None) => {}
            Err(e) => {
                debug!("Text lookup failed ({}), trying role lookup", e);
                if let Some(hit) = attempt(page, Strategy::Role, role_query(descriptor)).await {
                    return hit;
                }
            }
        }
    }

    if let Some(hit) = attempt(page, Strategy::Placeholder, placeholder_query(descriptor)).await
    {
        return hit;
    }

    for query in data_attribute_queries(descriptor) {
        if let Some(hit) = attempt(page, Strategy::DataAttribute, Some(query)).await {
            return hit;
        }
    }

    if let Some(hit) = attempt(page, Strategy::Class, class_query(descriptor)).await {
        return hit;
    }

    if let Some(text) = label_text(descriptor) {
        match resolve_by_label(page, text).await {
            Ok(Some((handle, selector))) => {
                return ResolutionResult::found(handle, Strategy::Label, selector);
            }
            Ok(None) => {}
            Err(e) => debug!("Label lookup failed for \"{}\": {}", text, e),
        }
    }

    match resolve_by_type(page, descriptor).await {
        Ok(Some((handle, selector))) => {
            ResolutionResult::found(handle, Strategy::TypeMatch, selector)
        }
        Ok(None) => ResolutionResult::not_found(),
        Err(e) => {
            debug!("Type match failed for {}: {}", descriptor.kind, e);
            ResolutionResult::not_found()
        }
    }
}

/// Find a label by text, then the control it points at via `for` or nests
async fn resolve_by_label<P: LivePage + ?Sized>(
    page: &P,
    text: &str,
) -> anyhow::Result<Option<(P::Handle, String)>> {
    let label_query = Query::Label(text.to_string());
    let Some(label) = page.query(&label_query).await? else {
        return Ok(None);
    };

    if let Some(target) = page
        .attribute(&label, "for")
        .await?
        .filter(|t| !t.trim().is_empty())
    {
        let selector = format!("#{}", escape_id(target.trim()));
        if let Some(handle) = page.query(&Query::css(selector.clone())).await? {
            return Ok(Some((handle, selector)));
        }
    }

    Ok(page
        .query_within(&label, "input")
        .await?
        .map(|handle| (handle, format!("{} >> input", label_query.describe()))))
}

/// Last resort: walk every element of the kind and compare text or placeholder
async fn resolve_by_type<P: LivePage + ?Sized>(
    page: &P,
    descriptor: &ElementDescriptor,
) -> anyhow::Result<Option<(P::Handle, String)>> {
    let expected = match descriptor.kind {
        ElementKind::Button => descriptor.text.as_deref(),
        ElementKind::Input => descriptor.placeholder.as_deref(),
        ElementKind::Select | ElementKind::Checkbox => None,
    };
    let Some(expected) = expected.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };

    let selector = kind_selector(descriptor.kind);
    let candidates = page.query_all(&selector).await?;

    for (index, handle) in candidates.into_iter().enumerate() {
        let actual = match descriptor.kind {
            ElementKind::Button => button_text(page, &handle).await,
            _ => page
                .attribute(&handle, "placeholder")
                .await
                .map(Option::unwrap_or_default),
        };

        match actual {
            Ok(actual) if actual.trim() == expected => {
                return Ok(Some((handle, format!("{} >> nth={}", selector, index))));
            }
            Ok(_) => {}
            Err(e) => debug!("Skipping candidate {} during type match: {}", index, e),
        }
    }

    Ok(None)
}

/// Text content, or the value of `<input type=button|submit|reset>`
async fn button_text<P: LivePage + ?Sized>(
    page: &P,
    handle: &P::Handle,
) -> anyhow::Result<String> {
    let text = page.text(handle).await?;
    if !text.trim().is_empty() {
        return Ok(text);
    }
    Ok(page.attribute(handle, "value").await?.unwrap_or_default())
}

#[cfg(test)]
#[path = "../resolver_test.rs"]
mod resolver_test;
