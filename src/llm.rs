//! OpenAI-compatible chat client that turns a page bundle into a verdict.
//!
//! The model is asked for a JSON object with `bugs`, `fixes` and
//! `suggestions`. Anything that goes wrong on the way (no key, HTTP failure,
//! unparseable reply) yields [`Verdict::fallback`] instead of an error.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::PageBundle;
use crate::snapshot::truncate_chars;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const MAX_PROMPT_CONSOLE: usize = 50;
pub const MAX_PROMPT_NETWORK: usize = 50;
pub const MAX_PROMPT_HTML_CHARS: usize = 15_000;
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("no API key configured (set BUGSIGHT_LLM_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response had no message content")]
    EmptyResponse,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            api_key: get("BUGSIGHT_LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            base_url: get("BUGSIGHT_LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("BUGSIGHT_LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(
                get("BUGSIGHT_LLM_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bug {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

fn default_severity() -> String {
    "medium".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// What the model concluded about a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    #[serde(default)]
    pub bugs: Vec<Bug>,
    #[serde(default)]
    pub fixes: Vec<Fix>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Set when the reply could not be used
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl Verdict {
    pub fn fallback(reason: impl Into<String>) -> Self {
        Self {
            parse_error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Strip Markdown fences and surrounding prose, then decode the outermost object
pub fn parse_verdict(content: &str) -> Result<Verdict, String> {
    let trimmed = strip_fences(content.trim());
    let start = trimmed.find('{').ok_or("reply contains no JSON object")?;
    let end = trimmed.rfind('}').ok_or("reply contains no JSON object")?;
    if end < start {
        return Err("reply contains no JSON object".to_string());
    }

    let value: serde_json::Value = serde_json::from_str(&trimmed[start..=end])
        .map_err(|e| format!("invalid JSON: {}", e))?;
    let object = value.as_object().ok_or("reply is not a JSON object")?;
    if !["bugs", "fixes", "suggestions"]
        .iter()
        .any(|key| object.contains_key(*key))
    {
        return Err("reply has none of bugs, fixes or suggestions".to_string());
    }

    serde_json::from_value(value).map_err(|e| format!("unexpected verdict shape: {}", e))
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) on the opening line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

pub const SYSTEM_PROMPT: &str = "You are a senior front-end engineer reviewing a web page for bugs. \
You receive the page URL and title, console errors, failed network requests, the page HTML \
and a screenshot. Reply with a single JSON object and nothing else, shaped as \
{\"bugs\":[{\"title\":string,\"description\":string,\"severity\":\"low\"|\"medium\"|\"high\"|\"critical\",\"location\":string}],\
\"fixes\":[{\"title\":string,\"description\":string,\"code\":string}],\
\"suggestions\":[string]}. Use empty arrays when there is nothing to report.";

/// Text half of the user message
pub fn user_prompt(bundle: &PageBundle) -> String {
    let mut prompt = format!("URL: {}\nTitle: {}\n\n", bundle.url, bundle.title);

    prompt.push_str(&format!(
        "Console errors ({}):\n",
        bundle.console_errors.len()
    ));
    if bundle.console_errors.is_empty() {
        prompt.push_str("none\n");
    }
    for message in bundle.console_errors.iter().take(MAX_PROMPT_CONSOLE) {
        prompt.push_str(&format!("- [{}] {}\n", message.level, message.message));
    }

    prompt.push_str(&format!(
        "\nFailed network requests ({}):\n",
        bundle.network_errors.len()
    ));
    if bundle.network_errors.is_empty() {
        prompt.push_str("none\n");
    }
    for error in bundle.network_errors.iter().take(MAX_PROMPT_NETWORK) {
        let status = error
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "failed".to_string());
        prompt.push_str(&format!(
            "- {} {} [{}] {}: {}\n",
            error.method.as_deref().unwrap_or("GET"),
            error.url,
            status,
            error.kind,
            error.message
        ));
    }

    let html = truncate_chars(&bundle.html, MAX_PROMPT_HTML_CHARS);
    prompt.push_str("\nHTML");
    if html.len() < bundle.html.len() {
        prompt.push_str(&format!(" (first {} characters)", MAX_PROMPT_HTML_CHARS));
    }
    prompt.push_str(":\n");
    prompt.push_str(html);
    prompt
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: ChatContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        Self { config, http }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Ask the model about `bundle`. Never fails; problems become a fallback verdict.
    pub async fn analyze(&self, bundle: &PageBundle) -> Verdict {
        let content = match self.complete(bundle).await {
            Ok(content) => content,
            Err(e) => {
                warn!("LLM analysis unavailable: {}", e);
                return Verdict::fallback(e.to_string());
            }
        };

        match parse_verdict(&content) {
            Ok(verdict) => {
                info!(
                    "LLM reported {} bug(s), {} fix(es)",
                    verdict.bugs.len(),
                    verdict.fixes.len()
                );
                verdict
            }
            Err(reason) => {
                let preview = truncate_chars(&content, 200);
                warn!("Unusable LLM reply ({}): {}", reason, preview);
                Verdict::fallback(reason)
            }
        }
    }

    /// Raw message content of one chat completion
    pub async fn complete(&self, bundle: &PageBundle) -> Result<String, LlmError> {
        let api_key = self.config.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;

        let mut parts = vec![ContentPart::Text {
            text: user_prompt(bundle),
        }];
        if !bundle.screenshot_png.is_empty() {
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bundle.screenshot_png);
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/png;base64,{}", encoded),
                },
            });
        }

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: ChatContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user",
                    content: ChatContent::Parts(parts),
                },
            ],
            temperature: TEMPERATURE,
            response_format: ResponseFormat::JsonObject,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        debug!("Calling {} with model {}", url, self.config.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: truncate_chars(&body, 500).to_string(),
            });
        }

        let reply: ChatResponse = response.json().await?;
        reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

#[cfg(test)]
#[path = "llm_test.rs"]
mod llm_test;
