//! Resolve, classify and probe every descriptor of a snapshot.
//!
//! The four buckets run concurrently and so do the elements inside a bucket.
//! Results are collected by position, so each output bucket lines up with
//! its input regardless of completion order.

use futures::future::join_all;
use tracing::debug;

use crate::classifier::classify;
use crate::page::LivePage;
use crate::prober::{ProbeSettings, probe};
use crate::resolver::resolve;
use crate::types::{Buckets, ElementDescriptor, ElementKind, ElementReport, ElementSnapshot, TestOutcome};

pub const NOT_FOUND: &str = "Element not found using any selector strategy";

/// Outcome for a descriptor nothing on the page matched
pub fn not_found_outcome(kind: ElementKind) -> TestOutcome {
    let mut outcome = TestOutcome {
        error: Some(NOT_FOUND.to_string()),
        ..Default::default()
    };
    match kind {
        ElementKind::Button => outcome.clickable = Some(false),
        ElementKind::Input => outcome.fillable = Some(false),
        ElementKind::Select => {
            outcome.selectable = Some(false);
            outcome.clickable = Some(false);
        }
        ElementKind::Checkbox => {
            outcome.toggleable = Some(false);
            outcome.clickable = Some(false);
        }
    }
    outcome
}

/// Run the full pipeline for one descriptor
pub async fn test_element<P: LivePage + ?Sized>(
    page: &P,
    descriptor: &ElementDescriptor,
    settings: &ProbeSettings,
) -> ElementReport {
    let test_results = match resolve(page, descriptor).await.into_resolved() {
        Some(resolved) => {
            let classification = classify(page, &resolved.handle, settings.action_timeout).await;
            let mut outcome =
                probe(page, descriptor, &resolved.handle, classification, settings).await;
            outcome.selector = Some(resolved.selector);
            outcome.strategy_used = Some(resolved.strategy.as_str().to_string());
            outcome
        }
        None => {
            debug!("No strategy matched {} {:?}", descriptor.kind, descriptor.id);
            not_found_outcome(descriptor.kind)
        }
    };

    ElementReport {
        descriptor: descriptor.clone(),
        test_results,
    }
}

pub async fn test_bucket<P: LivePage + ?Sized>(
    page: &P,
    descriptors: &[ElementDescriptor],
    settings: &ProbeSettings,
) -> Vec<ElementReport> {
    join_all(
        descriptors
            .iter()
            .map(|descriptor| test_element(page, descriptor, settings)),
    )
    .await
}

/// Test every bucket of `snapshot` against the live page
pub async fn test_snapshot<P: LivePage + ?Sized>(
    page: &P,
    snapshot: &ElementSnapshot,
    settings: &ProbeSettings,
) -> Buckets<ElementReport> {
    let (buttons, inputs, dropdowns, checkboxes) = tokio::join!(
        test_bucket(page, &snapshot.buttons, settings),
        test_bucket(page, &snapshot.inputs, settings),
        test_bucket(page, &snapshot.dropdowns, settings),
        test_bucket(page, &snapshot.checkboxes, settings),
    );

    Buckets {
        buttons,
        inputs,
        dropdowns,
        checkboxes,
    }
}

#[cfg(test)]
#[path = "aggregator_test.rs"]
mod aggregator_test;
