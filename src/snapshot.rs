//! Static extraction of element descriptors from serialized page HTML.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::types::{ElementDescriptor, ElementKind, ElementSnapshot, SelectOption};

pub const DEFAULT_MAX_PER_KIND: usize = 50;

/// Input types that are not free-form text entry
const NON_TEXT_INPUTS: &[&str] = &[
    "checkbox", "radio", "button", "submit", "reset", "hidden", "image", "file",
];

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {:?}", css, e))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn input_type(element: ElementRef<'_>) -> String {
    element
        .value()
        .attr("type")
        .unwrap_or("text")
        .trim()
        .to_ascii_lowercase()
}

/// Build descriptors for every interactive element in `html`, at most
/// `max_per_kind` of each kind, in document order.
pub fn extract(html: &str, max_per_kind: usize) -> Result<ElementSnapshot> {
    let document = Html::parse_document(html);
    let labels = LabelIndex::build(&document)?;
    let mut snapshot = ElementSnapshot::default();

    let candidates = selector("button, input, textarea, select")?;
    for element in document.select(&candidates) {
        let Some(kind) = classify_tag(element) else {
            continue;
        };
        let bucket = snapshot.get_mut(kind);
        if bucket.len() >= max_per_kind {
            continue;
        }
        bucket.push(describe(element, kind, &labels));
    }

    Ok(snapshot)
}

fn classify_tag(element: ElementRef<'_>) -> Option<ElementKind> {
    match element.value().name() {
        "button" => Some(ElementKind::Button),
        "textarea" => Some(ElementKind::Input),
        "select" => Some(ElementKind::Select),
        "input" => match input_type(element).as_str() {
            "button" | "submit" | "reset" => Some(ElementKind::Button),
            "checkbox" => Some(ElementKind::Checkbox),
            t if NON_TEXT_INPUTS.contains(&t) => None,
            _ => Some(ElementKind::Input),
        },
        _ => None,
    }
}

fn describe(element: ElementRef<'_>, kind: ElementKind, labels: &LabelIndex) -> ElementDescriptor {
    let attrs = element.value();
    let mut descriptor = ElementDescriptor::new(kind);
    descriptor.id = non_empty(attrs.attr("id"));
    descriptor.name = non_empty(attrs.attr("name"));
    descriptor.class_name = non_empty(attrs.attr("class"));
    descriptor.data_attributes = attrs
        .attrs()
        .filter(|(name, _)| name.starts_with("data-"))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

    match kind {
        ElementKind::Button => {
            descriptor.text = non_empty(Some(collapse(&element.text().collect::<String>()).as_str()))
                .or_else(|| non_empty(attrs.attr("value")))
                .or_else(|| non_empty(attrs.attr("aria-label")));
        }
        ElementKind::Input => {
            descriptor.placeholder = attrs
                .attr("placeholder")
                .filter(|p| !p.is_empty())
                .map(str::to_string);
            descriptor.label_text = labels.label_for(element);
        }
        ElementKind::Select => {
            descriptor.options = element
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|e| e.value().name() == "option")
                .map(|option| {
                    let text = collapse(&option.text().collect::<String>());
                    SelectOption {
                        value: option
                            .value()
                            .attr("value")
                            .map(str::to_string)
                            .unwrap_or_else(|| text.clone()),
                        text,
                        selected: option.value().attr("selected").is_some(),
                    }
                })
                .collect();
        }
        ElementKind::Checkbox => {
            descriptor.label_text = labels.label_for(element);
        }
    }

    descriptor
}

/// Label text keyed by the id its `for` attribute points at
struct LabelIndex {
    by_target: HashMap<String, String>,
}

impl LabelIndex {
    fn build(document: &Html) -> Result<Self> {
        let labels = selector("label[for]")?;
        let mut by_target = HashMap::new();
        for label in document.select(&labels) {
            let text = collapse(&label.text().collect::<String>());
            if let Some(target) = label.value().attr("for")
                && !text.is_empty()
            {
                by_target.entry(target.to_string()).or_insert(text);
            }
        }
        Ok(Self { by_target })
    }

    fn label_for(&self, element: ElementRef<'_>) -> Option<String> {
        if let Some(id) = element.value().attr("id")
            && let Some(text) = self.by_target.get(id)
        {
            return Some(text.clone());
        }
        element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == "label")
            .map(|label| collapse(&label.text().collect::<String>()))
            .filter(|text| !text.is_empty())
    }
}

/// Head metadata reported by the streaming endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageHead {
    pub title: String,
    pub meta: Vec<MetaTag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaTag {
    pub name: String,
    pub content: String,
}

pub fn head(html: &str) -> Result<PageHead> {
    let document = Html::parse_document(html);
    let title = document
        .select(&selector("title")?)
        .next()
        .map(|t| collapse(&t.text().collect::<String>()))
        .unwrap_or_default();

    let meta = document
        .select(&selector("meta")?)
        .filter_map(|m| {
            let attrs = m.value();
            let name = attrs
                .attr("name")
                .or_else(|| attrs.attr("property"))
                .or_else(|| attrs.attr("charset").map(|_| "charset"))?;
            let content = attrs
                .attr("content")
                .or_else(|| attrs.attr("charset"))
                .unwrap_or_default();
            Some(MetaTag {
                name: name.to_string(),
                content: content.to_string(),
            })
        })
        .collect();

    Ok(PageHead { title, meta })
}

/// Inner HTML of `<body>`, or the whole document when there is none
pub fn body(html: &str) -> Result<String> {
    let document = Html::parse_document(html);
    Ok(document
        .select(&selector("body")?)
        .next()
        .map(|b| b.inner_html())
        .unwrap_or_else(|| html.to_string()))
}

/// First `max_chars` characters of `text`, never splitting a character
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
#[path = "snapshot_test.rs"]
mod snapshot_test;
