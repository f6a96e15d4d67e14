//! Per-kind selector tables and the small amount of escaping the chain applies.
//!
//! Only `#` and `.` in ids and `"` in quoted attribute values are escaped.
//! Other CSS-significant characters (`[`, `]`, `:`, `\`) pass through untouched
//! and usually make the selector invalid, which the chain treats as a miss.

use crate::page::Query;
use crate::types::{ElementDescriptor, ElementKind};

const BUTTON_SELECTORS: &[&str] = &[
    "button",
    "input[type=\"button\"]",
    "input[type=\"submit\"]",
    "input[type=\"reset\"]",
];

const INPUT_SELECTORS: &[&str] = &[
    "input:not([type=\"checkbox\"]):not([type=\"radio\"]):not([type=\"button\"]):not([type=\"submit\"]):not([type=\"reset\"]):not([type=\"hidden\"]):not([type=\"image\"]):not([type=\"file\"])",
    "textarea",
];

const SELECT_SELECTORS: &[&str] = &["select"];

const CHECKBOX_SELECTORS: &[&str] = &["input[type=\"checkbox\"]"];

/// Base selectors matching every live element of `kind`
pub fn kind_selectors(kind: ElementKind) -> &'static [&'static str] {
    match kind {
        ElementKind::Button => BUTTON_SELECTORS,
        ElementKind::Input => INPUT_SELECTORS,
        ElementKind::Select => SELECT_SELECTORS,
        ElementKind::Checkbox => CHECKBOX_SELECTORS,
    }
}

/// Selector list matching every live element of `kind`
pub fn kind_selector(kind: ElementKind) -> String {
    kind_selectors(kind).join(", ")
}

/// Append `qualifier` to each base selector of `kind` and join them into one selector list
pub fn qualified(kind: ElementKind, qualifier: &str) -> String {
    kind_selectors(kind)
        .iter()
        .map(|base| format!("{}{}", base, qualifier))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn escape_id(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for c in id.chars() {
        if c == '#' || c == '.' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn escape_quotes(value: &str) -> String {
    value.replace('"', "\\\"")
}

fn attribute_equals(name: &str, value: &str) -> String {
    format!("[{}=\"{}\"]", name, escape_quotes(value))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub fn id_query(descriptor: &ElementDescriptor) -> Option<Query> {
    let id = non_empty(&descriptor.id)?;
    Some(Query::Css(format!("#{}", escape_id(id))))
}

pub fn name_query(descriptor: &ElementDescriptor) -> Option<Query> {
    let name = non_empty(&descriptor.name)?;
    Some(Query::Css(qualified(
        descriptor.kind,
        &attribute_equals("name", name),
    )))
}

pub fn text_query(descriptor: &ElementDescriptor) -> Option<Query> {
    if descriptor.kind != ElementKind::Button {
        return None;
    }
    let text = non_empty(&descriptor.text)?;
    Some(Query::Text {
        kind: descriptor.kind,
        text: text.to_string(),
    })
}

/// Accessible-role lookup used when the text lookup itself fails
pub fn role_query(descriptor: &ElementDescriptor) -> Option<Query> {
    if descriptor.kind != ElementKind::Button {
        return None;
    }
    let text = non_empty(&descriptor.text)?;
    Some(Query::Role {
        role: "button".to_string(),
        name: text.to_string(),
    })
}

pub fn placeholder_query(descriptor: &ElementDescriptor) -> Option<Query> {
    if descriptor.kind != ElementKind::Input {
        return None;
    }
    // Exact attribute value, untrimmed
    let placeholder = descriptor.placeholder.as_deref().filter(|p| !p.is_empty())?;
    Some(Query::Css(qualified(
        descriptor.kind,
        &attribute_equals("placeholder", placeholder),
    )))
}

/// One query per captured `data-*` attribute, in descriptor order
pub fn data_attribute_queries(descriptor: &ElementDescriptor) -> Vec<Query> {
    descriptor
        .data_attributes
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| {
            Query::Css(qualified(descriptor.kind, &attribute_equals(name, value)))
        })
        .collect()
}

pub fn class_query(descriptor: &ElementDescriptor) -> Option<Query> {
    let first = descriptor
        .class_name
        .as_deref()?
        .split_whitespace()
        .next()?;
    Some(Query::Css(qualified(descriptor.kind, &format!(".{}", first))))
}

/// Label text for kinds that can be labelled
pub fn label_text(descriptor: &ElementDescriptor) -> Option<&str> {
    match descriptor.kind {
        ElementKind::Input | ElementKind::Checkbox => non_empty(&descriptor.label_text),
        _ => None,
    }
}
