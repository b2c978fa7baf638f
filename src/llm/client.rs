use super::{InferenceRequest, InferenceResponse, InferenceService, ToolCallMessage};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const REQUEST_TIMEOUT_SECS: u64 = 90;

/// Maximum length for error content in error messages
const MAX_ERROR_CONTENT_LEN: usize = 200;

/// OpenAI-compatible chat completions client.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ChatCompletionsClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    #[serde(flatten)]
    inner: &'a InferenceRequest,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallMessage>>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl InferenceService for ChatCompletionsClient {
    async fn run(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "inference request"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .header("X-Title", "Apps Script Agent")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ChatRequest {
                inner: request,
                stream: false,
            })
            .send()
            .await
            .context("Inference request failed")?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(err_resp) = serde_json::from_str::<ErrorResponse>(&text) {
                return Err(anyhow!(
                    "API error {}: {}",
                    status,
                    sanitize_api_response(&err_resp.error.message)
                ));
            }
            return Err(anyhow!("API error {}: {}", status, sanitize_api_response(&text)));
        }

        parse_chat_response(&text)
    }
}

/// Map a chat completions body onto [`InferenceResponse`]. Tool calls that
/// arrive without an id get a generated one so results can be matched up.
pub fn parse_chat_response(text: &str) -> Result<InferenceResponse> {
    let parsed: ChatResponse = serde_json::from_str(text).map_err(|e| {
        anyhow!(
            "Failed to parse response: {}\n{}",
            e,
            sanitize_api_response(text)
        )
    })?;

    let message = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No response from model"))?
        .message;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|mut call| {
            if call.id.is_empty() {
                call.id = format!("call_{}", Uuid::new_v4().simple());
            }
            call
        })
        .collect();

    Ok(InferenceResponse {
        response: message.content,
        tool_calls,
    })
}

/// Sanitize API response content for error messages to prevent credential leakage.
fn sanitize_api_response(content: &str) -> String {
    const SECRET_PATTERNS: &[&str] = &[
        "api_key",
        "apikey",
        "secret",
        "password",
        "credential",
        "bearer",
        "sk-",
        "ghp_",
    ];

    let truncated = truncate_str(content, MAX_ERROR_CONTENT_LEN);

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(response details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated.to_string()
}

/// Truncate a string for display (Unicode-safe)
pub(crate) fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &s[..byte_idx],
        None => s,
    }
}
