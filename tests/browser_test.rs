// End-to-end tests against a real browser; each one skips without a WebDriver

use bugsight::config::ServerConfig;
use bugsight::llm::{LlmClient, LlmConfig};
use bugsight::server::{AppState, router};
use bugsight::types::{ElementDescriptor, ElementKind};
use bugsight::{ProbeSettings, Strategy, pipeline, resolve, snapshot, test_element};
use serial_test::serial;
use std::time::Duration;

use test_server::ensure_test_server;

use test_utils::{cleanup_webdrivers, get_test_browser};

fn quick_config(screenshot_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        settle: Duration::from_millis(1500),
        screenshot_dir: screenshot_dir.to_path_buf(),
        ..Default::default()
    }
}

#[tokio::test]
#[serial]
async fn test_scan_signup_form() {
    let server = ensure_test_server().await;
    let Some(browser) = get_test_browser().await else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.settle = Duration::ZERO;

    let analysis = pipeline::scan(&browser, &format!("{}/form", server.base_url), &config)
        .await
        .unwrap();

    assert_eq!(analysis.title, "Signup");
    assert_eq!(analysis.summary.total, 5);
    assert_eq!(analysis.summary.found, 5);

    let button = &analysis.elements.buttons[0].test_results;
    assert_eq!(button.strategy_used.as_deref(), Some("id"));
    assert_eq!(button.selector.as_deref(), Some("#submit-btn"));
    assert_eq!(button.clickable, Some(true));

    let email = analysis
        .elements
        .inputs
        .iter()
        .find(|r| r.descriptor.name.as_deref() == Some("email"))
        .unwrap();
    assert_eq!(email.test_results.strategy_used.as_deref(), Some("name"));
    assert_eq!(email.test_results.disabled, Some(true));
    assert_eq!(email.test_results.fillable, Some(false));

    let plan = &analysis.elements.dropdowns[0].test_results;
    assert_eq!(plan.selectable, Some(true));

    let terms = &analysis.elements.checkboxes[0];
    assert_eq!(terms.descriptor.label_text.as_deref(), Some("Accept terms"));
    assert_eq!(terms.test_results.toggleable, Some(true));
    assert_eq!(terms.test_results.initial_checked, Some(false));
    assert_eq!(terms.test_results.final_checked, Some(false));

    let _ = browser.close().await;
    cleanup_webdrivers();
}

#[tokio::test]
#[serial]
async fn test_interaction_checks_leave_inputs_untouched() {
    let server = ensure_test_server().await;
    let Some(browser) = get_test_browser().await else {
        return;
    };
    browser.goto(&format!("{}/form", server.base_url)).await.unwrap();

    let descriptor = ElementDescriptor::new(ElementKind::Input).with_id("username");
    let report = test_element(&browser, &descriptor, &ProbeSettings::default()).await;
    assert_eq!(report.test_results.fillable, Some(true));

    let value = browser
        .execute("return document.getElementById('username').value;", vec![])
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!(""));

    let _ = browser.close().await;
    cleanup_webdrivers();
}

#[tokio::test]
#[serial]
async fn test_fallback_strategies_in_browser() {
    let server = ensure_test_server().await;
    let Some(browser) = get_test_browser().await else {
        return;
    };
    browser.goto(&format!("{}/labels", server.base_url)).await.unwrap();

    let newsletter = ElementDescriptor::new(ElementKind::Checkbox).with_label("Newsletter");
    let result = resolve(&browser, &newsletter).await;
    assert_eq!(result.strategy_used(), Some(Strategy::Label));

    let save = ElementDescriptor::new(ElementKind::Button).with_data("data-testid", "save");
    let result = resolve(&browser, &save).await;
    assert_eq!(result.strategy_used(), Some(Strategy::DataAttribute));
    assert!(result.selector().unwrap().starts_with(r#"button[data-testid="save"]"#));

    let styled = ElementDescriptor::new(ElementKind::Checkbox).with_class("opt-in large");
    let result = resolve(&browser, &styled).await;
    assert_eq!(result.strategy_used(), Some(Strategy::Class));

    let missing = ElementDescriptor::new(ElementKind::Button).with_id("nope");
    let report = test_element(&browser, &missing, &ProbeSettings::default()).await;
    assert_eq!(report.test_results.strategy_used, None);
    assert_eq!(report.test_results.clickable, Some(false));

    let _ = browser.close().await;
    cleanup_webdrivers();
}

#[tokio::test]
#[serial]
async fn test_hidden_controls_are_not_actionable() {
    let server = ensure_test_server().await;
    let Some(browser) = get_test_browser().await else {
        return;
    };
    browser.goto(&format!("{}/hidden", server.base_url)).await.unwrap();
    let html = browser.source().await.unwrap();
    let descriptors = snapshot::extract(&html, 50).unwrap();
    let reports = bugsight::test_snapshot(&browser, &descriptors, &ProbeSettings::default()).await;

    for report in reports.iter() {
        assert!(
            !report.test_results.is_interactive(),
            "{:?} should not be interactive",
            report.descriptor
        );
    }

    let _ = browser.close().await;
    cleanup_webdrivers();
}

#[tokio::test]
#[serial]
async fn test_analyze_broken_page_with_stub_model() {
    let server = ensure_test_server().await;
    let Some(browser) = get_test_browser().await else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let config = quick_config(dir.path());
    let llm = LlmClient::new(LlmConfig {
        api_key: Some("sk-fixture".to_string()),
        base_url: format!("{}/v1", server.base_url),
        ..Default::default()
    });

    let analysis = pipeline::analyze(
        &browser,
        &llm,
        &format!("{}/broken", server.base_url),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(analysis.title, "Broken");
    assert!(
        analysis
            .console_errors
            .iter()
            .any(|m| m.message.contains("Items failed to render"))
    );
    assert!(
        analysis
            .network_errors
            .iter()
            .any(|e| e.url.ends_with("/api/items") && e.status == Some(500))
    );
    assert_eq!(analysis.analysis.bugs[0].title, "Item list fails to load");
    assert_eq!(analysis.analysis.parse_error, None);

    let screenshot = analysis.screenshot.unwrap();
    assert!(dir.path().join(screenshot).exists());

    let _ = browser.close().await;
    cleanup_webdrivers();
}

#[tokio::test]
#[serial]
async fn test_navigation_failure_is_reported() {
    let Some(browser) = get_test_browser().await else {
        return;
    };
    let err = browser.goto("http://127.0.0.1:9/").await;
    if let Err(e) = err {
        assert!(format!("{:#}", e).contains("Navigation to"));
    }

    let _ = browser.close().await;
    cleanup_webdrivers();
}

/// Serve the bugsight API on an ephemeral port inside the current runtime
async fn spawn_api(state: AppState) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Split a finished SSE body into (event name, JSON data) pairs
fn parse_events(body: &str) -> Vec<(String, serde_json::Value)> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut name = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    name = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data.push_str(rest.trim_start());
                }
            }
            Some((name?, serde_json::from_str(&data).unwrap()))
        })
        .collect()
}

async fn read_stream(api: &str, target: &str) -> Vec<(String, serde_json::Value)> {
    let response = tokio::time::timeout(Duration::from_secs(120), async {
        reqwest::Client::new()
            .get(format!("{}/api/analyze-url-stream", api))
            .query(&[("url", target)])
            .send()
            .await
            .unwrap()
    })
    .await
    .expect("stream did not start");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let body = tokio::time::timeout(Duration::from_secs(120), response.text())
        .await
        .expect("stream did not finish")
        .unwrap();
    parse_events(&body)
}

#[tokio::test]
#[serial]
async fn test_stream_reports_each_stage_in_order() {
    let server = ensure_test_server().await;
    let Some(browser) = get_test_browser().await else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.pool.browser_type = browser.browser_type();
    let _ = browser.close().await;

    let llm = LlmClient::new(LlmConfig {
        api_key: Some("sk-fixture".to_string()),
        base_url: format!("{}/v1", server.base_url),
        ..Default::default()
    });
    let state = AppState::new(config, llm);
    let api = spawn_api(state.clone()).await;

    let events = read_stream(&api, &format!("{}/broken", server.base_url)).await;
    let names: Vec<&str> = events.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["status", "status", "console", "network", "head", "body", "status", "complete"]
    );

    let stages: Vec<&str> = events
        .iter()
        .filter(|(name, _)| name == "status")
        .map(|(_, data)| data["stage"].as_str().unwrap())
        .collect();
    assert_eq!(stages, vec!["browser", "navigate", "analyze"]);

    let console = &events[2].1["errors"];
    assert!(
        console
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["message"].as_str().unwrap().contains("Items failed to render"))
    );
    assert_eq!(events[4].1["title"], "Broken");
    assert!(events[5].1["html"].as_str().unwrap().contains("Load items"));
    assert_eq!(events[5].1["truncated"], false);

    let complete = &events[7].1;
    assert_eq!(complete["title"], "Broken");
    assert_eq!(
        complete["analysis"]["bugs"][0]["title"],
        "Item list fails to load"
    );
    let screenshot = complete["screenshot"].as_str().unwrap();
    assert!(screenshot.starts_with("/screenshots/"));

    let served = reqwest::get(format!("{}{}", api, screenshot)).await.unwrap();
    assert_eq!(served.status(), reqwest::StatusCode::OK);

    state.pool.close_all().await;
    cleanup_webdrivers();
}

#[tokio::test]
#[serial]
async fn test_stream_ends_with_error_event_on_failed_navigation() {
    let Some(browser) = get_test_browser().await else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let mut config = quick_config(dir.path());
    config.settle = Duration::ZERO;
    config.pool.browser_type = browser.browser_type();
    let _ = browser.close().await;

    let state = AppState::new(config, LlmClient::new(LlmConfig::default()));
    let api = spawn_api(state.clone()).await;

    let events = read_stream(&api, "http://127.0.0.1:9/").await;
    assert_eq!(events[0].0, "status");
    assert_eq!(events[0].1["stage"], "browser");

    let (name, data) = events.last().unwrap();
    // Some drivers render an error page instead of failing the navigation
    if name == "error" {
        assert_eq!(data["error"], "navigation_failed");
        let message = data["message"].as_str().unwrap();
        assert_eq!(message.matches("Navigation to").count(), 1, "{}", message);
        assert!(!events.iter().any(|(name, _)| name == "complete"));
    } else {
        assert_eq!(name, "complete");
    }

    state.pool.close_all().await;
    cleanup_webdrivers();
}
