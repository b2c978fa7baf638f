//! Conversation orchestrator.
//!
//! One chat request is a two-round exchange with the model:
//!
//! ```text
//! AwaitingModel ──(no tool calls)──────────────────────────────> reply
//!       │
//!       └─(tool calls)─> DispatchingTools ─> AwaitingFollowUp ─> reply
//! ```
//!
//! Tools are offered on the first round only. Their results are fed back so
//! the final answer reflects what actually happened in the sandbox.

use crate::config::GitToolsConfig;
use crate::guard::ALLOWED_FILES;
use crate::llm::client::truncate_str;
use crate::llm::{
    InferenceRequest, InferenceResponse, InferenceService, Message, Role, ToolCallMessage,
};
use crate::sandbox::{Sandbox, SandboxOps};
use crate::tools::{execute_tool, get_tool_definitions, ToolResult};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Generation budget for both rounds.
pub const MAX_TOKENS: u32 = 2048;

/// Reply used when the model returns no text.
pub const FALLBACK_REPLY: &str = "I'm sorry, I couldn't generate a response.";

const SYSTEM_PROMPT: &str = "You are an assistant that edits a Google Apps Script project stored in a git repository.

You can only work with these files in the project root: {files}.

Workflow:
1. Call clone_repo before touching any file.
2. Use read_file to see the current contents before changing them.
3. Use write_file with the complete new contents of a file.
4. Call commit_changes with a short message, then push_changes.
5. Call deploy_to_apps_script only when the user asks to publish.

Keep answers short and tell the user exactly which files you changed.";

/// Where the conversation currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationState {
    /// Transcript ready for the first inference call.
    AwaitingModel { transcript: Vec<Message> },
    /// The model asked for tools; run them in order.
    DispatchingTools {
        transcript: Vec<Message>,
        content: Option<String>,
        tool_calls: Vec<ToolCallMessage>,
    },
    /// Tool results are in the transcript; ask for the final reply.
    AwaitingFollowUp { transcript: Vec<Message> },
}

/// Outcome of advancing a [`ConversationState`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Next(ConversationState),
    Reply(String),
}

/// System prologue followed by the caller's messages.
pub fn compose_transcript(messages: Vec<Message>) -> Vec<Message> {
    let prompt = SYSTEM_PROMPT.replace("{files}", &ALLOWED_FILES.join(", "));
    let mut transcript = Vec::with_capacity(messages.len() + 1);
    transcript.push(Message::system(prompt));
    transcript.extend(messages);
    transcript
}

/// Text of a response, or [`FALLBACK_REPLY`] when absent or blank.
pub fn reply_text(response: &InferenceResponse) -> String {
    match response.response.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => FALLBACK_REPLY.to_string(),
    }
}

/// Decide what follows the first inference call.
pub fn after_first_round(transcript: Vec<Message>, response: InferenceResponse) -> Transition {
    if response.tool_calls.is_empty() {
        return Transition::Reply(reply_text(&response));
    }
    Transition::Next(ConversationState::DispatchingTools {
        transcript,
        content: response.response,
        tool_calls: response.tool_calls,
    })
}

/// Echo the tool calls as an assistant turn, then one tool message per result.
pub fn append_tool_results(
    mut transcript: Vec<Message>,
    content: Option<String>,
    tool_calls: Vec<ToolCallMessage>,
    results: Vec<ToolResult>,
) -> Vec<Message> {
    transcript.push(Message::assistant_tool_calls(content, tool_calls));
    transcript.extend(
        results
            .into_iter()
            .map(|r| Message::tool_result(r.tool_call_id, r.content)),
    );
    transcript
}

/// Longest per-tool excerpt in [`follow_up_failure_reply`].
const SUMMARY_EXCERPT_CHARS: usize = 200;

/// Reply used when the follow-up call fails after tools already ran: the
/// fallback text plus one line per tool result, so changes already made in
/// the repository are not silently lost.
pub fn follow_up_failure_reply(transcript: &[Message]) -> String {
    let names: Vec<(&str, &str)> = transcript
        .iter()
        .filter_map(|m| m.tool_calls.as_ref())
        .flatten()
        .map(|call| (call.id.as_str(), call.function.name.as_str()))
        .collect();

    let lines: Vec<String> = transcript
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| {
            let id = m.tool_call_id.as_deref().unwrap_or("");
            let name = names
                .iter()
                .rev()
                .find(|(call_id, _)| *call_id == id)
                .map(|(_, name)| *name)
                .unwrap_or("tool");
            let first_line = m
                .content
                .as_deref()
                .and_then(|c| c.lines().find(|l| !l.trim().is_empty()))
                .unwrap_or("(no output)");
            format!("- {}: {}", name, truncate_str(first_line.trim(), SUMMARY_EXCERPT_CHARS))
        })
        .collect();

    if lines.is_empty() {
        return FALLBACK_REPLY.to_string();
    }
    format!("{}\n\nTool results:\n{}", FALLBACK_REPLY, lines.join("\n"))
}

/// Run every call sequentially, in the order the model listed them. Later
/// calls may depend on files written by earlier ones.
pub async fn dispatch_tools(ops: &SandboxOps<'_>, tool_calls: &[ToolCallMessage]) -> Vec<ToolResult> {
    let mut results = Vec::with_capacity(tool_calls.len());
    for call in tool_calls {
        results.push(execute_tool(ops, call).await);
    }
    results
}

/// Drives one chat request against the inference and sandbox services.
#[derive(Clone)]
pub struct Agent {
    inference: Arc<dyn InferenceService>,
    sandbox: Arc<dyn Sandbox>,
    model: String,
}

impl Agent {
    pub fn new(
        inference: Arc<dyn InferenceService>,
        sandbox: Arc<dyn Sandbox>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            inference,
            sandbox,
            model: model.into(),
        }
    }

    /// Produce the assistant's reply to `messages`.
    pub async fn respond(&self, messages: Vec<Message>, git: &GitToolsConfig) -> Result<String> {
        let ops = SandboxOps::new(self.sandbox.as_ref(), git);
        let mut state = ConversationState::AwaitingModel {
            transcript: compose_transcript(messages),
        };

        loop {
            match self.step(state, &ops).await? {
                Transition::Next(next) => state = next,
                Transition::Reply(reply) => return Ok(reply),
            }
        }
    }

    /// Advance the conversation by one state.
    pub async fn step(&self, state: ConversationState, ops: &SandboxOps<'_>) -> Result<Transition> {
        match state {
            ConversationState::AwaitingModel { transcript } => {
                let request = InferenceRequest {
                    model: self.model.clone(),
                    messages: transcript.clone(),
                    tools: Some(get_tool_definitions()),
                    max_tokens: MAX_TOKENS,
                };
                let response = self
                    .inference
                    .run(&request)
                    .await
                    .context("Inference request failed")?;
                debug!(tool_calls = response.tool_calls.len(), "first round complete");
                Ok(after_first_round(transcript, response))
            }
            ConversationState::DispatchingTools {
                transcript,
                content,
                tool_calls,
            } => {
                info!(count = tool_calls.len(), "dispatching tool calls");
                let results = dispatch_tools(ops, &tool_calls).await;
                Ok(Transition::Next(ConversationState::AwaitingFollowUp {
                    transcript: append_tool_results(transcript, content, tool_calls, results),
                }))
            }
            ConversationState::AwaitingFollowUp { transcript } => {
                let request = InferenceRequest {
                    model: self.model.clone(),
                    messages: transcript,
                    tools: None,
                    max_tokens: MAX_TOKENS,
                };
                match self.inference.run(&request).await {
                    Ok(response) => Ok(Transition::Reply(reply_text(&response))),
                    Err(err) => {
                        warn!(error = %format!("{:#}", err), "follow-up inference failed after tools ran");
                        Ok(Transition::Reply(follow_up_failure_reply(&request.messages)))
                    }
                }
            }
        }
    }
}
