use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::page::{LivePage, within};

/// Three independent facts about a resolved element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub visible: bool,
    pub enabled: bool,
    pub has_dimensions: bool,
}

impl Classification {
    /// Base predicate every interaction is gated on
    pub fn actionable(&self) -> bool {
        self.visible && self.enabled && self.has_dimensions
    }
}

/// Probe visibility, enablement and size concurrently. A probe that errors
/// or outlives `limit` reads as `false`.
pub async fn classify<P: LivePage + ?Sized>(
    page: &P,
    element: &P::Handle,
    limit: Duration,
) -> Classification {
    let (visible, enabled, bounds) = tokio::join!(
        within(limit, page.is_visible(element)),
        within(limit, page.is_enabled(element)),
        within(limit, page.bounding_box(element)),
    );

    let visible = visible.unwrap_or_else(|e| {
        debug!("Visibility probe failed: {}", e);
        false
    });
    let enabled = enabled.unwrap_or_else(|e| {
        debug!("Enabled probe failed: {}", e);
        false
    });
    let has_dimensions = match bounds {
        Ok(Some(bounds)) => !bounds.is_empty(),
        Ok(None) => false,
        Err(e) => {
            debug!("Bounding box probe failed: {}", e);
            false
        }
    };

    Classification {
        visible,
        enabled,
        has_dimensions,
    }
}

#[cfg(test)]
#[path = "classifier_test.rs"]
mod classifier_test;
