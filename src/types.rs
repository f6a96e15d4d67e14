use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::webdriver::ConsoleMessage;

/// The four kinds of interactive element that get exercised
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Button,
    Input,
    Select,
    Checkbox,
}

impl ElementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementKind::Button => "button",
            ElementKind::Input => "input",
            ElementKind::Select => "select",
            ElementKind::Checkbox => "checkbox",
        }
    }

    /// Name of the result bucket this kind is grouped into
    pub fn bucket(&self) -> &'static str {
        match self {
            ElementKind::Button => "buttons",
            ElementKind::Input => "inputs",
            ElementKind::Select => "dropdowns",
            ElementKind::Checkbox => "checkboxes",
        }
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `<option>` of a captured `<select>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub selected: bool,
}

/// Static description of one element, taken from a DOM snapshot before any interaction.
///
/// Only fields that make sense for `kind` are ever filled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub kind: ElementKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Trimmed visible or aria text (buttons)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Placeholder attribute (inputs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Raw class attribute
    #[serde(rename = "class", default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// `data-*` attribute name and value pairs, in document order
    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "ordered_pairs")]
    pub data_attributes: Vec<(String, String)>,
    /// Text of the associated `<label>` (inputs and checkboxes)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_text: Option<String>,
    /// Declared options (selects)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
}

impl ElementDescriptor {
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            id: None,
            name: None,
            text: None,
            placeholder: None,
            class_name: None,
            data_attributes: Vec::new(),
            label_text: None,
            options: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Appends a data attribute, replacing the value of an existing one in place
    pub fn with_data(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let (name, value) = (name.into(), value.into());
        match self.data_attributes.iter().position(|(n, _)| *n == name) {
            Some(index) => self.data_attributes[index].1 = value,
            None => self.data_attributes.push((name, value)),
        }
        self
    }

    pub fn data_attribute(&self, name: &str) -> Option<&str> {
        self.data_attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label_text = Some(label.into());
        self
    }

    pub fn with_option(mut self, value: impl Into<String>, text: impl Into<String>) -> Self {
        self.options.push(SelectOption {
            value: value.into(),
            text: text.into(),
            selected: false,
        });
        self
    }
}

/// Outcome of classifying and probing one element.
///
/// Exactly the capability flags that belong to the element kind are set:
/// `clickable` for buttons, `fillable` (plus `disabled`) for inputs,
/// `selectable` and `clickable` for selects, `toggleable` and `clickable` for checkboxes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub visible: bool,
    pub enabled: bool,
    pub has_dimensions: bool,
    /// Selector (or lookup description) that located the element
    pub selector: Option<String>,
    /// Name of the strategy that located the element
    pub strategy_used: Option<String>,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clickable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fillable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toggleable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_checked: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_checked: Option<bool>,
}

impl TestOutcome {
    /// Whether the kind-specific capability flag came out true
    pub fn is_interactive(&self) -> bool {
        self.fillable
            .or(self.selectable)
            .or(self.toggleable)
            .or(self.clickable)
            .unwrap_or(false)
    }
}

/// A descriptor with its test results attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementReport {
    #[serde(flatten)]
    pub descriptor: ElementDescriptor,
    pub test_results: TestOutcome,
}

/// Per-kind grouping used for both snapshots and reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Buckets<T> {
    #[serde(default)]
    pub buttons: Vec<T>,
    #[serde(default)]
    pub inputs: Vec<T>,
    #[serde(default)]
    pub dropdowns: Vec<T>,
    #[serde(default)]
    pub checkboxes: Vec<T>,
}

impl<T> Default for Buckets<T> {
    fn default() -> Self {
        Self {
            buttons: Vec::new(),
            inputs: Vec::new(),
            dropdowns: Vec::new(),
            checkboxes: Vec::new(),
        }
    }
}

impl<T> Buckets<T> {
    pub fn get(&self, kind: ElementKind) -> &[T] {
        match kind {
            ElementKind::Button => &self.buttons,
            ElementKind::Input => &self.inputs,
            ElementKind::Select => &self.dropdowns,
            ElementKind::Checkbox => &self.checkboxes,
        }
    }

    pub fn get_mut(&mut self, kind: ElementKind) -> &mut Vec<T> {
        match kind {
            ElementKind::Button => &mut self.buttons,
            ElementKind::Input => &mut self.inputs,
            ElementKind::Select => &mut self.dropdowns,
            ElementKind::Checkbox => &mut self.checkboxes,
        }
    }

    pub fn total(&self) -> usize {
        self.buttons.len() + self.inputs.len() + self.dropdowns.len() + self.checkboxes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buttons
            .iter()
            .chain(self.inputs.iter())
            .chain(self.dropdowns.iter())
            .chain(self.checkboxes.iter())
    }
}

/// Descriptors grouped by kind, as extracted from a snapshot
pub type ElementSnapshot = Buckets<ElementDescriptor>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub total: usize,
    pub found: usize,
    pub interactive: usize,
}

impl ScanSummary {
    pub fn from_reports(reports: &Buckets<ElementReport>) -> Self {
        let mut summary = ScanSummary::default();
        for report in reports.iter() {
            summary.total += 1;
            if report.test_results.strategy_used.is_some() {
                summary.found += 1;
            }
            if report.test_results.is_interactive() {
                summary.interactive += 1;
            }
        }
        summary
    }
}

/// Response of the DOM analysis endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomAnalysis {
    pub url: String,
    pub title: String,
    pub analyzed_at: DateTime<Utc>,
    pub elements: Buckets<ElementReport>,
    pub summary: ScanSummary,
    pub console_errors: Vec<ConsoleMessage>,
}

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Browser viewport dimensions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1920x1080")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1920x1080)");
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

impl std::str::FromStr for ViewportSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ViewportSize::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Name/value pairs carried as a JSON object without losing their order
mod ordered_pairs {
    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        pairs: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(pairs.iter().map(|(name, value)| (name, value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        struct PairsVisitor;

        impl<'de> Visitor<'de> for PairsVisitor {
            type Value = Vec<(String, String)>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attribute names to string values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some(pair) = map.next_entry::<String, String>()? {
                    pairs.push(pair);
                }
                Ok(pairs)
            }
        }

        deserializer.deserialize_map(PairsVisitor)
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
