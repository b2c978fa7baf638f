//! Agentic tool definitions and execution for editing the Apps Script project.
//!
//! Every tool maps onto one [`SandboxOps`] call. Execution never fails: bad
//! arguments, rejected file names and sandbox errors all come back as text
//! for the model to read.

use crate::guard::{allowed_files_display, sanitize_commit_message, validate_file_name};
use crate::llm::ToolCallMessage;
use crate::sandbox::SandboxOps;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  TOOL DEFINITIONS
// ═══════════════════════════════════════════════════════════════════════════

/// Tool definitions for the LLM
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// Result of executing a tool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
}

fn function(name: &'static str, description: &'static str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function",
        function: FunctionDefinition {
            name,
            description,
            parameters,
        },
    }
}

fn no_parameters() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// All tools the model may call, in the order a typical edit uses them.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    let filename = serde_json::json!({
        "type": "string",
        "enum": crate::guard::ALLOWED_FILES,
        "description": "File in the project root"
    });

    vec![
        function(
            "clone_repo",
            "Clone the Apps Script project repository into the sandbox. Call this before reading or writing files.",
            no_parameters(),
        ),
        function(
            "list_files",
            "List the files in the cloned project.",
            no_parameters(),
        ),
        function(
            "read_file",
            "Read the full contents of a project file.",
            serde_json::json!({
                "type": "object",
                "properties": { "filename": filename.clone() },
                "required": ["filename"]
            }),
        ),
        function(
            "write_file",
            "Overwrite a project file with new contents. Always send the complete file.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "filename": filename,
                    "content": {
                        "type": "string",
                        "description": "Complete new file contents"
                    }
                },
                "required": ["filename", "content"]
            }),
        ),
        function(
            "commit_changes",
            "Stage and commit all changes in the project.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "Short commit message describing the change"
                    }
                },
                "required": ["message"]
            }),
        ),
        function(
            "push_changes",
            "Push committed changes to the main branch of the remote repository.",
            no_parameters(),
        ),
        function(
            "deploy_to_apps_script",
            "Push the current project files to the linked Google Apps Script project.",
            no_parameters(),
        ),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  TOOL EXECUTION
// ═══════════════════════════════════════════════════════════════════════════

/// Maximum output size for command results (4KB ≈ 1k tokens)
const MAX_OUTPUT_SIZE: usize = 4000;

/// Execute a tool call and return the result. Never panics or errors.
pub async fn execute_tool(ops: &SandboxOps<'_>, tool_call: &ToolCallMessage) -> ToolResult {
    let name = tool_call.function.name.as_str();
    let content = match parse_arguments(&tool_call.function.arguments) {
        Ok(args) => dispatch(ops, name, &args).await,
        Err(err) => format!("{}\n{}", invalid_arguments_error(name), err),
    };
    let content = ops.git_config().redact(&content);

    if content.starts_with("Error:") || content.starts_with("Unknown tool:") {
        warn!(tool = name, id = %tool_call.id, "tool call failed");
    } else {
        info!(tool = name, id = %tool_call.id, bytes = content.len(), "tool call completed");
    }

    ToolResult {
        tool_call_id: tool_call.id.clone(),
        content,
    }
}

/// Fixed first line of the result when a call's arguments cannot be used.
fn invalid_arguments_error(name: &str) -> String {
    format!("Error: invalid JSON arguments for {}", name)
}

/// Arguments arrive as JSON text. Blank text means no arguments; anything
/// other than an object is rejected.
fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected an object, got {}", json_type(&other))),
        Err(e) => Err(e.to_string()),
    }
}

async fn dispatch(ops: &SandboxOps<'_>, name: &str, args: &Map<String, Value>) -> String {
    match name {
        "clone_repo" => outcome(ops.clone_repo().await),
        "list_files" => outcome(ops.list_files().await.map(truncate_output)),
        "read_file" => {
            let filename = match checked_file_name(args) {
                Ok(f) => f,
                Err(e) => return e,
            };
            outcome(ops.read_file(filename).await)
        }
        "write_file" => {
            let filename = match checked_file_name(args) {
                Ok(f) => f,
                Err(e) => return e,
            };
            let content = match string_arg(args, "content") {
                Ok(c) => c,
                Err(e) => return e,
            };
            outcome(
                ops.write_file(filename, content)
                    .await
                    .map(|_| format!("Wrote {} bytes to {}", content.len(), filename)),
            )
        }
        "commit_changes" => {
            let message = match string_arg(args, "message") {
                Ok(m) => sanitize_commit_message(m),
                Err(e) => return e,
            };
            outcome(ops.commit(&message).await.map(truncate_output))
        }
        "push_changes" => outcome(ops.push().await.map(truncate_output)),
        "deploy_to_apps_script" => match ops.git_config().script_id.clone() {
            Some(script_id) => outcome(ops.deploy(&script_id).await.map(truncate_output)),
            None => "Error: no Apps Script project is configured (APPS_SCRIPT_ID is not set)"
                .to_string(),
        },
        _ => format!("Unknown tool: {}", name),
    }
}

fn outcome(result: anyhow::Result<String>) -> String {
    match result {
        Ok(text) => text,
        Err(err) => format!("Error: {:#}", err),
    }
}

fn string_arg<'a>(args: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(format!(
            "Error: '{}' must be a string, got {}",
            key,
            json_type(other)
        )),
        None => Err(format!("Error: missing required argument '{}'", key)),
    }
}

fn checked_file_name(args: &Map<String, Value>) -> Result<&str, String> {
    let filename = string_arg(args, "filename")?;
    if !validate_file_name(filename) {
        return Err(format!(
            "Error: file '{}' is not allowed. Allowed files: {}",
            filename,
            allowed_files_display()
        ));
    }
    Ok(filename)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Truncate output at line boundary
fn truncate_output(result: String) -> String {
    if result.len() <= MAX_OUTPUT_SIZE {
        return result;
    }
    let mut cut = MAX_OUTPUT_SIZE;
    while !result.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncate_at = result[..cut].rfind('\n').unwrap_or(cut);
    format!("{}\n\n... (output truncated)", &result[..truncate_at])
}
