//! HTTP boundary
//!
//! Routes:
//! - `GET  /api/health`   liveness check
//! - `GET  /api`          capability listing
//! - `POST /api/chat`     run the agent on a message list
//! - `GET  /api/projects` placeholder project list

use crate::agent::Agent;
use crate::config::GitToolsConfig;
use crate::llm::{Message, Role};
use anyhow::{anyhow, Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shown to the user whenever a chat request fails.
pub const ERROR_APOLOGY: &str = "Sorry, I encountered an error while processing your request.";

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Where each chat request gets its git settings from.
#[derive(Debug, Clone)]
pub enum GitConfigSource {
    /// Re-read the process environment per request.
    Environment,
    Fixed(GitToolsConfig),
}

impl GitConfigSource {
    pub fn resolve(&self) -> GitToolsConfig {
        match self {
            GitConfigSource::Environment => GitToolsConfig::from_env(),
            GitConfigSource::Fixed(config) => config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub agent: Agent,
    pub git: GitConfigSource,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api", get(api_info))
        .route("/api/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/projects", get(projects))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ═══════════════════════════════════════════════════════════════════════════
//  CHAT
// ═══════════════════════════════════════════════════════════════════════════

/// Validated `/api/chat` body.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
}

#[derive(Deserialize)]
struct IncomingMessage {
    role: String,
    content: String,
}

impl ChatRequest {
    /// Parse a raw body. The body must be a JSON object with a `messages`
    /// array; elements without a known role or string content are dropped.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(body).context("Request body is not valid JSON")?;
        let object = value
            .as_object()
            .ok_or_else(|| anyhow!("Request body must be a JSON object"))?;
        let raw_messages = object
            .get("messages")
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow!("Request body must include a 'messages' array"))?;

        let messages: Vec<Message> = raw_messages
            .iter()
            .filter_map(|raw| {
                let incoming: IncomingMessage = serde_json::from_value(raw.clone()).ok()?;
                let role = Role::from_client(&incoming.role)?;
                Some(Message::new(role, incoming.content))
            })
            .collect();

        if messages.is_empty() {
            return Err(anyhow!("No valid messages provided"));
        }
        Ok(Self { messages })
    }
}

#[derive(Debug, Serialize)]
struct ChatReply {
    message: String,
}

/// Request-level failure, rendered as the 500 error envelope.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let description = format!("{:#}", self.0);
        error!(error = %description, "chat request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "message": ERROR_APOLOGY,
                "error": description,
            })),
        )
            .into_response()
    }
}

async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Json<ChatReply>, ApiError> {
    let request = ChatRequest::from_json(&body)?;
    info!(messages = request.messages.len(), "chat request");

    let git = state.git.resolve();
    let message = state.agent.respond(request.messages, &git).await?;
    Ok(Json(ChatReply { message }))
}

// ═══════════════════════════════════════════════════════════════════════════
//  STATIC ROUTES
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: VERSION,
    })
}

async fn api_info() -> impl IntoResponse {
    Json(json!({
        "message": "Apps Script agent API",
        "version": VERSION,
        "endpoints": [
            "GET /api/health",
            "GET /api",
            "POST /api/chat",
            "GET /api/projects",
        ],
    }))
}

async fn projects() -> impl IntoResponse {
    Json(json!({
        "projects": [
            {
                "id": "default",
                "name": "Apps Script project",
                "description": "Project configured through GITHUB_REPO_URL",
            }
        ]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{InferenceResponse, ToolCallMessage};
    use crate::testing::{FakeSandbox, ScriptedInference};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(inference: Arc<ScriptedInference>) -> Router {
        let agent = Agent::new(inference, Arc::new(FakeSandbox::default()), "test-model");
        router(AppState {
            agent,
            git: GitConfigSource::Fixed(GitToolsConfig {
                repo_url: "https://github.com/acme/sheet-tools.git".to_string(),
                token: None,
                script_id: None,
            }),
        })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_chat(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[test]
    fn test_parse_drops_malformed_messages() {
        let body = br#"{"messages": [
            {"role": "user", "content": "hello"},
            {"role": "robot", "content": "beep"},
            {"role": "assistant", "content": 42},
            {"role": "tool", "content": "x"},
            "just a string",
            {"content": "no role"},
            {"role": "assistant", "content": "hi there"}
        ]}"#;
        let request = ChatRequest::from_json(body).unwrap();
        assert_eq!(
            request.messages,
            vec![
                Message::new(Role::User, "hello"),
                Message::new(Role::Assistant, "hi there"),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        let err = ChatRequest::from_json(b"[1, 2, 3]").unwrap_err();
        assert!(err.to_string().contains("JSON object"));
        assert!(ChatRequest::from_json(b"not json").is_err());
    }

    #[test]
    fn test_parse_requires_messages_array() {
        assert!(ChatRequest::from_json(br#"{"messages": "hi"}"#).is_err());
        assert!(ChatRequest::from_json(br#"{}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_all_invalid() {
        let err = ChatRequest::from_json(br#"{"messages": [{"role": "x"}]}"#).unwrap_err();
        assert_eq!(err.to_string(), "No valid messages provided");
    }

    #[tokio::test]
    async fn test_chat_returns_reply() {
        let inference = Arc::new(ScriptedInference::new(vec![InferenceResponse::text(
            "Hello from the agent",
        )]));
        let (status, body) = send(
            app(inference),
            post_chat(r#"{"messages": [{"role": "user", "content": "hi"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "message": "Hello from the agent" }));
    }

    #[tokio::test]
    async fn test_chat_with_unknown_tool_completes() {
        let inference = Arc::new(ScriptedInference::new(vec![
            InferenceResponse {
                response: None,
                tool_calls: vec![ToolCallMessage::new("c1", "nope", "{}")],
            },
            InferenceResponse::text("That tool doesn't exist."),
        ]));
        let (status, body) = send(
            app(inference),
            post_chat(r#"{"messages": [{"role": "user", "content": "do it"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "That tool doesn't exist.");
    }

    #[tokio::test]
    async fn test_chat_bad_body_is_error_envelope() {
        let inference = Arc::new(ScriptedInference::default());
        let (status, body) = send(app(inference.clone()), post_chat("not json")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], ERROR_APOLOGY);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .contains("Request body is not valid JSON"));
        assert!(inference.requests().is_empty());
    }

    #[tokio::test]
    async fn test_chat_inference_failure_is_error_envelope() {
        let inference = Arc::new(ScriptedInference::default());
        inference.push_error("model timed out");
        let (status, body) = send(
            app(inference),
            post_chat(r#"{"messages": [{"role": "user", "content": "hi"}]}"#),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], ERROR_APOLOGY);
        assert!(body["error"].as_str().unwrap().contains("model timed out"));
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = send(app(Arc::default()), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], VERSION);
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn test_api_info_lists_endpoints() {
        let (status, body) = send(app(Arc::default()), get("/api")).await;
        assert_eq!(status, StatusCode::OK);
        let endpoints = body["endpoints"].as_array().unwrap();
        assert!(endpoints.iter().any(|e| e == "POST /api/chat"));
    }

    #[tokio::test]
    async fn test_projects_placeholder() {
        let (status, body) = send(app(Arc::default()), get("/api/projects")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["projects"][0]["id"], "default");
    }
}
