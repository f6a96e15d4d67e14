//! One reversible interaction per element kind.
//!
//! | kind     | interaction                 | capability                  |
//! |----------|-----------------------------|-----------------------------|
//! | button   | none                        | `clickable` = actionable    |
//! | input    | fill, then restore          | `fillable`                  |
//! | select   | pick the first option       | `selectable`, `clickable`   |
//! | checkbox | click, compare, click back  | `toggleable`, `clickable`   |
//!
//! Every action runs under the configured timeout. Failures only ever turn
//! into a `false` capability and an `error` string.

use std::time::Duration;

use tracing::{debug, warn};

use crate::classifier::Classification;
use crate::page::{LivePage, OptionChoice, within};
use crate::types::{ElementDescriptor, ElementKind, TestOutcome};

pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_FILL_VALUE: &str = "test";

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Upper bound for every single probe or interaction
    pub action_timeout: Duration,
    /// Value typed into inputs
    pub fill_value: String,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            fill_value: DEFAULT_FILL_VALUE.to_string(),
        }
    }
}

impl ProbeSettings {
    pub fn with_timeout(action_timeout: Duration) -> Self {
        Self {
            action_timeout,
            ..Default::default()
        }
    }
}

/// Exercise `element` according to its kind and report the outcome.
///
/// `selector` and `strategy_used` are left for the caller to fill in.
pub async fn probe<P: LivePage + ?Sized>(
    page: &P,
    descriptor: &ElementDescriptor,
    element: &P::Handle,
    classification: Classification,
    settings: &ProbeSettings,
) -> TestOutcome {
    let mut outcome = TestOutcome {
        visible: classification.visible,
        enabled: classification.enabled,
        has_dimensions: classification.has_dimensions,
        ..Default::default()
    };
    let actionable = classification.actionable();

    match descriptor.kind {
        ElementKind::Button => {
            outcome.clickable = Some(actionable);
        }
        ElementKind::Input => {
            outcome.disabled = Some(!classification.enabled);
            outcome.fillable = Some(false);
            if actionable {
                match probe_fill(page, element, settings).await {
                    Ok(()) => outcome.fillable = Some(true),
                    Err(e) => outcome.error = Some(e),
                }
            }
        }
        ElementKind::Select => {
            outcome.clickable = Some(actionable);
            outcome.selectable = Some(false);
            if actionable {
                match probe_select(page, descriptor, element, settings).await {
                    Ok(()) => outcome.selectable = Some(true),
                    Err(e) => outcome.error = Some(e),
                }
            }
        }
        ElementKind::Checkbox => {
            outcome.clickable = Some(actionable);
            outcome.toggleable = Some(false);
            if actionable {
                match probe_toggle(page, element, settings).await {
                    Ok(toggle) => {
                        outcome.toggleable = Some(toggle.initial != toggle.toggled);
                        outcome.initial_checked = Some(toggle.initial);
                        outcome.final_checked = Some(toggle.restored);
                    }
                    Err(e) => outcome.error = Some(e),
                }
            }
        }
    }

    outcome
}

/// Fill the test value, then put the previous value back
async fn probe_fill<P: LivePage + ?Sized>(
    page: &P,
    element: &P::Handle,
    settings: &ProbeSettings,
) -> Result<(), String> {
    let limit = settings.action_timeout;
    let previous = within(limit, page.input_value(element))
        .await
        .unwrap_or_else(|e| {
            debug!("Could not read value before fill: {}", e);
            String::new()
        });

    within(limit, page.fill(element, &settings.fill_value))
        .await
        .map_err(|e| format!("Fill failed: {}", e))?;

    if let Err(e) = within(limit, page.fill(element, &previous)).await {
        warn!("Could not restore input value after probing: {}", e);
    }
    Ok(())
}

/// Select the first declared option by value, falling back to its text.
/// The selection is left in place.
async fn probe_select<P: LivePage + ?Sized>(
    page: &P,
    descriptor: &ElementDescriptor,
    element: &P::Handle,
    settings: &ProbeSettings,
) -> Result<(), String> {
    let first = descriptor
        .options
        .first()
        .ok_or_else(|| "No options to select".to_string())?;
    let limit = settings.action_timeout;

    let by_value = if first.value.is_empty() {
        Err(anyhow::anyhow!("option has no value"))
    } else {
        within(limit, page.select_option(element, &OptionChoice::Value(first.value.clone()))).await
    };

    match by_value {
        Ok(()) => Ok(()),
        Err(value_err) => {
            debug!("Select by value failed ({}), trying text", value_err);
            within(limit, page.select_option(element, &OptionChoice::Text(first.text.clone())))
                .await
                .map_err(|e| format!("Select failed: {}", e))
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Toggle {
    initial: bool,
    toggled: bool,
    restored: bool,
}

/// Click once and compare states; click again to undo a real toggle
async fn probe_toggle<P: LivePage + ?Sized>(
    page: &P,
    element: &P::Handle,
    settings: &ProbeSettings,
) -> Result<Toggle, String> {
    let limit = settings.action_timeout;
    let initial = within(limit, page.is_checked(element))
        .await
        .map_err(|e| format!("Could not read checked state: {}", e))?;

    within(limit, page.click(element))
        .await
        .map_err(|e| format!("Click failed: {}", e))?;

    let toggled = within(limit, page.is_checked(element))
        .await
        .map_err(|e| format!("Could not read checked state: {}", e))?;

    let mut restored = toggled;
    if toggled != initial {
        match within(limit, page.click(element)).await {
            Ok(()) => {
                restored = within(limit, page.is_checked(element))
                    .await
                    .unwrap_or(initial);
            }
            Err(e) => warn!("Could not restore checkbox state after probing: {}", e),
        }
    }

    Ok(Toggle {
        initial,
        toggled,
        restored,
    })
}

#[cfg(test)]
#[path = "prober_test.rs"]
mod prober_test;
