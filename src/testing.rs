//! In-memory stand-ins for the sandbox and inference services.

use crate::llm::{InferenceRequest, InferenceResponse, InferenceService};
use crate::sandbox::{CheckoutOptions, ExecOutput, Sandbox};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Sandbox that keeps files in a map and records every call.
#[derive(Default)]
pub struct FakeSandbox {
    files: Mutex<HashMap<String, String>>,
    reads: Mutex<Vec<String>>,
    checkouts: Mutex<Vec<(String, CheckoutOptions)>>,
    commands: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, ExecOutput>>,
}

impl FakeSandbox {
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Every later `exec` of `command` returns `output`.
    pub fn fail_command(&self, command: &str, output: ExecOutput) {
        self.failures
            .lock()
            .unwrap()
            .insert(command.to_string(), output);
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn checkouts(&self) -> Vec<(String, CheckoutOptions)> {
        self.checkouts.lock().unwrap().clone()
    }

    /// Commands as `program arg1 arg2 ...`.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    async fn checkout(&self, url: &str, options: &CheckoutOptions) -> Result<()> {
        self.checkouts
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        self.reads.lock().unwrap().push(path.to_string());
        self.file(path)
            .ok_or_else(|| anyhow!("No such file: {}", path))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn exec(&self, command: &str, args: &[&str], cwd: Option<&str>) -> Result<ExecOutput> {
        let mut line = command.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.commands.lock().unwrap().push(line);

        if let Some(output) = self.failures.lock().unwrap().get(command) {
            return Ok(output.clone());
        }

        let stdout = if command == "ls" {
            let prefix = format!("{}/", cwd.unwrap_or(""));
            let mut names: Vec<String> = self
                .files
                .lock()
                .unwrap()
                .keys()
                .filter_map(|path| path.strip_prefix(&prefix).map(str::to_string))
                .collect();
            names.sort();
            names.join("\n")
        } else {
            String::new()
        };

        Ok(ExecOutput {
            stdout,
            stderr: String::new(),
            exit_code: 0,
        })
    }
}

/// Inference service that replays queued responses and records requests.
#[derive(Default)]
pub struct ScriptedInference {
    responses: Mutex<VecDeque<Result<InferenceResponse, String>>>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new(responses: Vec<InferenceResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceService for ScriptedInference {
    async fn run(&self, request: &InferenceRequest) -> Result<InferenceResponse> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted response left")),
        }
    }
}
