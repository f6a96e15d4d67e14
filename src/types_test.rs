// Unit tests for types module

use super::*;
use pretty_assertions::assert_eq;

#[test]
fn test_viewport_size_parse() {
    // Valid formats
    let size = ViewportSize::parse("1920x1080").unwrap();
    assert_eq!(size.width, 1920);
    assert_eq!(size.height, 1080);

    let size: ViewportSize = "800x600".parse().unwrap();
    assert_eq!(size, ViewportSize { width: 800, height: 600 });

    // Invalid formats
    assert!(ViewportSize::parse("1920").is_err());
    assert!(ViewportSize::parse("1920x").is_err());
    assert!(ViewportSize::parse("x1080").is_err());
    assert!(ViewportSize::parse("abc x def").is_err());
    assert!(ViewportSize::parse("1920X1080").is_err()); // uppercase X
}

#[test]
fn test_element_kind_buckets() {
    assert_eq!(ElementKind::Button.bucket(), "buttons");
    assert_eq!(ElementKind::Input.bucket(), "inputs");
    assert_eq!(ElementKind::Select.bucket(), "dropdowns");
    assert_eq!(ElementKind::Checkbox.bucket(), "checkboxes");
    assert_eq!(ElementKind::Checkbox.to_string(), "checkbox");
}

#[test]
fn test_descriptor_omits_absent_fields() {
    let descriptor = ElementDescriptor::new(ElementKind::Button)
        .with_id("submit-btn")
        .with_text("Submit");

    let json = serde_json::to_value(&descriptor).unwrap();
    assert_eq!(
        json,
        serde_json::json!({"kind": "button", "id": "submit-btn", "text": "Submit"})
    );
}

#[test]
fn test_descriptor_uses_wire_names() {
    let descriptor = ElementDescriptor::new(ElementKind::Input)
        .with_class("field wide")
        .with_label("Email")
        .with_data("data-testid", "email");

    let json = serde_json::to_value(&descriptor).unwrap();
    assert_eq!(json["class"], "field wide");
    assert_eq!(json["labelText"], "Email");
    assert_eq!(json["dataAttributes"]["data-testid"], "email");
}

#[test]
fn test_report_flattens_descriptor_and_attaches_results() {
    let report = ElementReport {
        descriptor: ElementDescriptor::new(ElementKind::Button).with_id("go"),
        test_results: TestOutcome {
            visible: true,
            enabled: true,
            has_dimensions: true,
            selector: Some("#go".to_string()),
            strategy_used: Some("id".to_string()),
            clickable: Some(true),
            ..Default::default()
        },
    };

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["id"], "go");
    assert_eq!(json["testResults"]["hasDimensions"], true);
    assert_eq!(json["testResults"]["clickable"], true);
    assert_eq!(json["testResults"]["error"], serde_json::Value::Null);
    assert!(json["testResults"].get("fillable").is_none());

    let back: ElementReport = serde_json::from_value(json).unwrap();
    assert_eq!(back, report);
}

#[test]
fn test_outcome_is_interactive_uses_kind_capability() {
    let checkbox = TestOutcome {
        clickable: Some(true),
        toggleable: Some(false),
        ..Default::default()
    };
    assert!(!checkbox.is_interactive());

    let button = TestOutcome {
        clickable: Some(true),
        ..Default::default()
    };
    assert!(button.is_interactive());

    assert!(!TestOutcome::default().is_interactive());
}

#[test]
fn test_buckets_access_by_kind() {
    let mut snapshot = ElementSnapshot::default();
    snapshot
        .get_mut(ElementKind::Select)
        .push(ElementDescriptor::new(ElementKind::Select));
    snapshot
        .get_mut(ElementKind::Button)
        .push(ElementDescriptor::new(ElementKind::Button));

    assert_eq!(snapshot.total(), 2);
    assert_eq!(snapshot.dropdowns.len(), 1);
    assert_eq!(snapshot.get(ElementKind::Input).len(), 0);
    assert_eq!(snapshot.iter().next().unwrap().kind, ElementKind::Button);
}

#[test]
fn test_scan_summary_counts() {
    let found = ElementReport {
        descriptor: ElementDescriptor::new(ElementKind::Button),
        test_results: TestOutcome {
            strategy_used: Some("id".to_string()),
            clickable: Some(true),
            ..Default::default()
        },
    };
    let missing = ElementReport {
        descriptor: ElementDescriptor::new(ElementKind::Input),
        test_results: TestOutcome {
            fillable: Some(false),
            error: Some("Element not found using any selector strategy".to_string()),
            ..Default::default()
        },
    };

    let reports = Buckets {
        buttons: vec![found],
        inputs: vec![missing],
        ..Default::default()
    };

    assert_eq!(
        ScanSummary::from_reports(&reports),
        ScanSummary {
            total: 2,
            found: 1,
            interactive: 1
        }
    );
}

#[test]
fn test_bounding_box_empty() {
    let zero = BoundingBox {
        x: 10.0,
        y: 10.0,
        width: 0.0,
        height: 20.0,
    };
    assert!(zero.is_empty());

    let real = BoundingBox {
        x: 0.0,
        y: 0.0,
        width: 80.0,
        height: 24.0,
    };
    assert!(!real.is_empty());
}

#[test]
fn test_data_attributes_serialize_in_document_order() {
    let descriptor = ElementDescriptor::new(ElementKind::Button)
        .with_data("data-testid", "buy")
        .with_data("data-action", "checkout")
        .with_data("data-testid", "purchase");

    assert_eq!(descriptor.data_attribute("data-testid"), Some("purchase"));
    assert_eq!(descriptor.data_attribute("data-missing"), None);

    let json = serde_json::to_string(&descriptor).unwrap();
    assert_eq!(
        json,
        r#"{"kind":"button","dataAttributes":{"data-testid":"purchase","data-action":"checkout"}}"#
    );

    let back: ElementDescriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(back.data_attributes, descriptor.data_attributes);
}

#[test]
fn test_dom_analysis_reads_back_from_json() {
    let json = r##"{
        "url": "http://localhost/form",
        "title": "Signup",
        "analyzedAt": "2024-05-01T12:00:00Z",
        "elements": {
            "buttons": [{
                "kind": "button",
                "id": "go",
                "dataAttributes": {"data-z": "1", "data-a": "2"},
                "testResults": {
                    "visible": true, "enabled": true, "hasDimensions": true,
                    "selector": "#go", "strategyUsed": "id", "error": null,
                    "clickable": true
                }
            }]
        },
        "summary": {"total": 1, "found": 1, "interactive": 1},
        "consoleErrors": []
    }"##;

    let analysis: DomAnalysis = serde_json::from_str(json).unwrap();
    assert_eq!(analysis.title, "Signup");
    assert_eq!(analysis.elements.total(), 1);
    assert!(analysis.elements.inputs.is_empty());

    let button = &analysis.elements.buttons[0];
    assert_eq!(button.descriptor.id.as_deref(), Some("go"));
    assert_eq!(
        button.descriptor.data_attributes,
        vec![
            ("data-z".to_string(), "1".to_string()),
            ("data-a".to_string(), "2".to_string()),
        ]
    );
    assert_eq!(button.test_results.clickable, Some(true));
}
