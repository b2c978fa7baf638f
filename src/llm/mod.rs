//! Inference service types and client.

pub mod client;

pub use client::ChatCompletionsClient;

use crate::tools::ToolDefinition;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Parse a role sent by a chat client. Only conversational roles are
    /// accepted; tool messages are produced internally.
    pub fn from_client(role: &str) -> Option<Self> {
        match role {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            _ => None,
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Assistant turn that requested `tool_calls`.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCallMessage>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool call requested by the model. `arguments` is raw JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallMessage {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default = "default_call_type")]
    pub call_type: String,
    pub function: FunctionCallMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallMessage {
    pub name: String,
    #[serde(default, deserialize_with = "arguments_text")]
    pub arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

/// Some backends send `arguments` as a JSON object or `null` instead of a
/// string. Normalize to text so a bad payload fails in the tool dispatcher
/// for that one call rather than here for the whole response.
fn arguments_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl ToolCallMessage {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call_type: default_call_type(),
            function: FunctionCallMessage {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// One inference call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    pub max_tokens: u32,
}

/// What the model returned: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InferenceResponse {
    pub response: Option<String>,
    pub tool_calls: Vec<ToolCallMessage>,
}

impl InferenceResponse {
    pub fn text(response: impl Into<String>) -> Self {
        Self {
            response: Some(response.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// Request/response inference endpoint.
#[async_trait]
pub trait InferenceService: Send + Sync {
    async fn run(&self, request: &InferenceRequest) -> Result<InferenceResponse>;
}
