//! Named sandbox operations backing the agent's tools.
//!
//! Mechanism only: file names are joined onto [`WORK_DIR`] as given. The
//! tool dispatcher validates them against the allow-list before calling in.
//! Nothing here is transactional; a failed push leaves the local commit.

use super::{CheckoutOptions, ExecOutput, Sandbox};
use crate::config::GitToolsConfig;
use anyhow::{anyhow, Context, Result};
use tracing::debug;

/// Checkout location inside the sandbox.
pub const WORK_DIR: &str = "/workspace/repo";

pub const PUSH_BRANCH: &str = "main";

/// clasp project file written before a deploy.
pub const DEPLOY_CONFIG_FILE: &str = ".clasp.json";

const CLONE_DEPTH: u32 = 1;
const COMMIT_AUTHOR_NAME: &str = "Apps Script Agent";
const COMMIT_AUTHOR_EMAIL: &str = "agent@appscript-agent.local";

/// Sandbox operations bound to one request's git configuration.
pub struct SandboxOps<'a> {
    sandbox: &'a dyn Sandbox,
    git: &'a GitToolsConfig,
}

impl<'a> SandboxOps<'a> {
    pub fn new(sandbox: &'a dyn Sandbox, git: &'a GitToolsConfig) -> Self {
        Self { sandbox, git }
    }

    pub fn git_config(&self) -> &GitToolsConfig {
        self.git
    }

    /// Absolute sandbox path for a file in the checkout.
    pub fn file_path(file_name: &str) -> String {
        format!("{}/{}", WORK_DIR, file_name)
    }

    /// Shallow-clone the configured repository into [`WORK_DIR`].
    pub async fn clone_repo(&self) -> Result<String> {
        let url = self.git.authenticated_url()?;
        let options = CheckoutOptions {
            target_dir: WORK_DIR.to_string(),
            depth: CLONE_DEPTH,
        };
        self.sandbox
            .checkout(&url, &options)
            .await
            .context("Failed to clone repository")?;
        Ok(format!(
            "Cloned {} into {}",
            self.git.redact(&self.git.repo_url),
            WORK_DIR
        ))
    }

    pub async fn read_file(&self, file_name: &str) -> Result<String> {
        let path = Self::file_path(file_name);
        self.sandbox
            .read_file(&path)
            .await
            .with_context(|| format!("Failed to read {}", file_name))
    }

    pub async fn write_file(&self, file_name: &str, content: &str) -> Result<()> {
        let path = Self::file_path(file_name);
        self.sandbox
            .write_file(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", file_name))
    }

    /// Directory listing of the checkout.
    pub async fn list_files(&self) -> Result<String> {
        self.run_command("ls", &["-la"]).await
    }

    /// Run a command in [`WORK_DIR`] and return its stdout. A non-zero exit
    /// becomes an error carrying stderr (or stdout when stderr is empty).
    pub async fn run_command(&self, command: &str, args: &[&str]) -> Result<String> {
        debug!(command, subcommand = args.first().copied().unwrap_or(""), "sandbox exec");
        let output = self
            .sandbox
            .exec(command, args, Some(WORK_DIR))
            .await
            .with_context(|| format!("Failed to run {}", command))?;
        check_output(command, args, output)
    }

    /// Stage everything and commit with `message`. The caller sanitizes the
    /// message.
    pub async fn commit(&self, message: &str) -> Result<String> {
        self.run_command("git", &["add", "-A"]).await?;

        let name = format!("user.name={}", COMMIT_AUTHOR_NAME);
        let email = format!("user.email={}", COMMIT_AUTHOR_EMAIL);
        let stdout = self
            .run_command(
                "git",
                &["-c", name.as_str(), "-c", email.as_str(), "commit", "-m", message],
            )
            .await?;
        Ok(non_empty_or(stdout, "Changes committed"))
    }

    /// Point `origin` at the credentialed URL and push [`PUSH_BRANCH`].
    pub async fn push(&self) -> Result<String> {
        let url = self.git.authenticated_url()?;
        self.run_command("git", &["remote", "set-url", "origin", url.as_str()])
            .await?;

        let output = self
            .sandbox
            .exec("git", &["push", "origin", PUSH_BRANCH], Some(WORK_DIR))
            .await
            .context("Failed to run git push")?;
        // git reports push progress on stderr
        let summary = if output.stdout.trim().is_empty() {
            output.stderr.clone()
        } else {
            output.stdout.clone()
        };
        check_output("git", &["push"], output)?;
        Ok(non_empty_or(summary, &format!("Pushed {} to origin", PUSH_BRANCH)))
    }

    /// Write the clasp project file for `script_id` and push the checkout to
    /// Apps Script.
    pub async fn deploy(&self, script_id: &str) -> Result<String> {
        let clasp = serde_json::json!({ "scriptId": script_id, "rootDir": "." });
        let content = serde_json::to_string_pretty(&clasp)?;
        self.write_file(DEPLOY_CONFIG_FILE, &content).await?;

        let stdout = self.run_command("clasp", &["push", "--force"]).await?;
        Ok(non_empty_or(stdout, "Pushed project to Apps Script"))
    }
}

fn check_output(command: &str, args: &[&str], output: ExecOutput) -> Result<String> {
    if output.success() {
        return Ok(output.stdout);
    }

    let detail = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    Err(anyhow!(
        "`{} {}` exited with code {}: {}",
        command,
        args.first().copied().unwrap_or(""),
        output.exit_code,
        detail
    ))
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}
