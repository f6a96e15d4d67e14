//! In-memory [`LivePage`] backed by an HTML fixture.
//!
//! Handles are element indices in document order. The fixture is re-parsed
//! for every call so no parsed tree is ever held across an await; form state
//! (values, checked flags) lives beside it and is mutated by the interactions.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::page::{LivePage, OptionChoice, Query};
use crate::resolver::selectors::kind_selector;
use crate::types::{BoundingBox, ElementKind};

#[derive(Debug, Default, Clone)]
struct ControlState {
    value: Option<String>,
    checked: Option<bool>,
}

pub struct FakePage {
    html: String,
    state: Mutex<HashMap<usize, ControlState>>,
    broken: HashSet<usize>,
    delays: HashMap<usize, Duration>,
    fail_text_lookup: bool,
    clicks: Mutex<Vec<usize>>,
}

fn css(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{}': {:?}", selector, e))
}

fn text_of(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn style_has(element: ElementRef<'_>, declaration: &str) -> bool {
    element
        .value()
        .attr("style")
        .map(|s| s.replace(' ', "").to_ascii_lowercase().contains(declaration))
        .unwrap_or(false)
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    if element.value().name() == "input" && element.value().attr("type") == Some("hidden") {
        return true;
    }
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .any(|e| {
            e.value().attr("hidden").is_some()
                || style_has(e, "display:none")
                || style_has(e, "visibility:hidden")
        })
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn options_of(select: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    select
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "option")
        .collect()
}

fn option_value(option: ElementRef<'_>) -> String {
    option
        .value()
        .attr("value")
        .map(str::to_string)
        .unwrap_or_else(|| text_of(option).trim().to_string())
}

impl FakePage {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            state: Mutex::new(HashMap::new()),
            broken: HashSet::new(),
            delays: HashMap::new(),
            fail_text_lookup: false,
            clicks: Mutex::new(Vec::new()),
        }
    }

    /// Make every interaction with the matching element fail
    pub fn with_broken(mut self, selector: &str) -> Self {
        let handle = self.handle(selector);
        self.broken.insert(handle);
        self
    }

    /// Delay every probe and interaction on the matching element
    pub fn with_delay(mut self, selector: &str, delay: Duration) -> Self {
        let handle = self.handle(selector);
        self.delays.insert(handle, delay);
        self
    }

    /// Make text lookups error instead of returning a result
    pub fn with_failing_text_lookup(mut self) -> Self {
        self.fail_text_lookup = true;
        self
    }

    /// Handle of the first element matching `selector`; panics when absent
    pub fn handle(&self, selector: &str) -> usize {
        self.select_all(selector)
            .expect("valid selector")
            .into_iter()
            .next()
            .unwrap_or_else(|| panic!("no element matches {}", selector))
    }

    pub fn value_of(&self, selector: &str) -> String {
        self.current_value(self.handle(selector))
            .expect("element has a value")
    }

    pub fn checked_of(&self, selector: &str) -> bool {
        self.current_checked(self.handle(selector))
            .expect("element exists")
    }

    pub fn click_count(&self) -> usize {
        self.clicks.lock().unwrap().len()
    }

    fn with_elements<R>(&self, f: impl FnOnce(&[ElementRef<'_>]) -> R) -> R {
        let document = Html::parse_document(&self.html);
        let elements: Vec<ElementRef<'_>> = document
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .collect();
        f(&elements)
    }

    fn with_element<R>(
        &self,
        handle: usize,
        f: impl FnOnce(ElementRef<'_>, &[ElementRef<'_>]) -> Result<R>,
    ) -> Result<R> {
        self.with_elements(|elements| {
            let element = elements
                .get(handle)
                .copied()
                .ok_or_else(|| anyhow!("stale element reference: {}", handle))?;
            f(element, elements)
        })
    }

    fn index_of(elements: &[ElementRef<'_>], target: ElementRef<'_>) -> Option<usize> {
        elements.iter().position(|e| e.id() == target.id())
    }

    fn select_all(&self, selector: &str) -> Result<Vec<usize>> {
        let selector = css(selector)?;
        Ok(self.with_elements(|elements| {
            elements
                .iter()
                .enumerate()
                .filter(|(_, e)| selector.matches(e))
                .map(|(i, _)| i)
                .collect()
        }))
    }

    fn find(&self, query: &Query) -> Result<Option<usize>> {
        match query {
            Query::Css(selector) => Ok(self.select_all(selector)?.into_iter().next()),
            Query::Text { kind, text } => {
                if self.fail_text_lookup {
                    bail!("text engine unavailable");
                }
                let candidates = css(&kind_selector(*kind))?;
                Ok(self.with_elements(|elements| {
                    elements.iter().position(|e| {
                        candidates.matches(e)
                            && (contains_ci(&text_of(*e), text)
                                || e.value().attr("value").is_some_and(|v| contains_ci(v, text)))
                    })
                }))
            }
            Query::Role { role, name } => {
                let implicit = css(&kind_selector(ElementKind::Button))?;
                Ok(self.with_elements(|elements| {
                    elements.iter().position(|e| {
                        let has_role = e.value().attr("role") == Some(role.as_str())
                            || (role == "button" && implicit.matches(e));
                        let accessible = e
                            .value()
                            .attr("aria-label")
                            .map(str::to_string)
                            .unwrap_or_else(|| text_of(*e));
                        has_role && contains_ci(&accessible, name)
                    })
                }))
            }
            Query::Label(text) => Ok(self.with_elements(|elements| {
                elements
                    .iter()
                    .position(|e| e.value().name() == "label" && contains_ci(&text_of(*e), text))
            })),
        }
    }

    fn current_value(&self, handle: usize) -> Result<String> {
        if let Some(value) = self.state_of(handle).value {
            return Ok(value);
        }
        self.with_element(handle, |element, _| {
            Ok(match element.value().name() {
                "textarea" => text_of(element),
                "select" => {
                    let options = options_of(element);
                    options
                        .iter()
                        .find(|o| o.value().attr("selected").is_some())
                        .or_else(|| options.first())
                        .map(|o| option_value(*o))
                        .unwrap_or_default()
                }
                _ => element.value().attr("value").unwrap_or_default().to_string(),
            })
        })
    }

    fn current_checked(&self, handle: usize) -> Result<bool> {
        if let Some(checked) = self.state_of(handle).checked {
            return Ok(checked);
        }
        self.with_element(handle, |element, _| Ok(element.value().attr("checked").is_some()))
    }

    fn state_of(&self, handle: usize) -> ControlState {
        self.state
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }

    fn update(&self, handle: usize, f: impl FnOnce(&mut ControlState)) {
        let mut state = self.state.lock().unwrap();
        f(state.entry(handle).or_default());
    }

    /// Common preconditions for any user interaction
    fn ensure_interactable(&self, handle: usize) -> Result<()> {
        if self.broken.contains(&handle) {
            bail!("element is not interactable");
        }
        self.with_element(handle, |element, _| {
            if element.value().attr("disabled").is_some() {
                bail!("element is disabled");
            }
            if is_hidden(element) {
                bail!("element is not visible");
            }
            Ok(())
        })
    }

    async fn pause(&self, handle: usize) {
        if let Some(delay) = self.delays.get(&handle) {
            tokio::time::sleep(*delay).await;
        }
    }
}

#[async_trait]
impl LivePage for FakePage {
    type Handle = usize;

    async fn query(&self, query: &Query) -> Result<Option<usize>> {
        self.find(query)
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<usize>> {
        self.select_all(selector)
    }

    async fn query_within(&self, parent: &usize, selector: &str) -> Result<Option<usize>> {
        let selector = css(selector)?;
        self.with_element(*parent, |element, elements| {
            Ok(element
                .descendants()
                .skip(1)
                .filter_map(ElementRef::wrap)
                .find(|e| selector.matches(e))
                .and_then(|e| Self::index_of(elements, e)))
        })
    }

    async fn is_visible(&self, element: &usize) -> Result<bool> {
        self.pause(*element).await;
        self.with_element(*element, |e, _| Ok(!is_hidden(e)))
    }

    async fn is_enabled(&self, element: &usize) -> Result<bool> {
        self.pause(*element).await;
        self.with_element(*element, |e, _| Ok(e.value().attr("disabled").is_none()))
    }

    async fn bounding_box(&self, element: &usize) -> Result<Option<BoundingBox>> {
        self.pause(*element).await;
        self.with_element(*element, |e, _| {
            if is_hidden(e) {
                return Ok(None);
            }
            let collapsed = style_has(e, "width:0") || style_has(e, "height:0");
            Ok(Some(BoundingBox {
                x: 8.0,
                y: 8.0,
                width: if collapsed { 0.0 } else { 120.0 },
                height: if collapsed { 0.0 } else { 24.0 },
            }))
        })
    }

    async fn attribute(&self, element: &usize, name: &str) -> Result<Option<String>> {
        self.with_element(*element, |e, _| Ok(e.value().attr(name).map(str::to_string)))
    }

    async fn text(&self, element: &usize) -> Result<String> {
        self.with_element(*element, |e, _| Ok(text_of(e)))
    }

    async fn input_value(&self, element: &usize) -> Result<String> {
        self.pause(*element).await;
        self.current_value(*element)
    }

    async fn fill(&self, element: &usize, value: &str) -> Result<()> {
        self.pause(*element).await;
        self.ensure_interactable(*element)?;
        self.with_element(*element, |e, _| match e.value().name() {
            "input" | "textarea" => Ok(()),
            other => bail!("cannot fill <{}>", other),
        })?;
        self.update(*element, |state| state.value = Some(value.to_string()));
        Ok(())
    }

    async fn select_option(&self, element: &usize, choice: &OptionChoice) -> Result<()> {
        self.pause(*element).await;
        self.ensure_interactable(*element)?;
        let value = self.with_element(*element, |e, _| {
            if e.value().name() != "select" {
                bail!("element is not a <select>");
            }
            options_of(e)
                .into_iter()
                .find(|o| match choice {
                    OptionChoice::Value(v) => option_value(*o) == *v,
                    OptionChoice::Text(t) => text_of(*o).trim() == t.trim(),
                })
                .map(option_value)
                .ok_or_else(|| anyhow!("no option matches {:?}", choice))
        })?;
        self.update(*element, |state| state.value = Some(value));
        Ok(())
    }

    async fn click(&self, element: &usize) -> Result<()> {
        self.pause(*element).await;
        self.ensure_interactable(*element)?;
        let toggles = self.with_element(*element, |e, _| {
            Ok(e.value().name() == "input"
                && matches!(e.value().attr("type"), Some("checkbox") | Some("radio")))
        })?;
        if toggles {
            let checked = self.current_checked(*element)?;
            self.update(*element, |state| state.checked = Some(!checked));
        }
        self.clicks.lock().unwrap().push(*element);
        Ok(())
    }

    async fn is_checked(&self, element: &usize) -> Result<bool> {
        self.pause(*element).await;
        self.current_checked(*element)
    }
}
