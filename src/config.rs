//! Configuration for the agent backend
//!
//! Server settings come from the command line (with environment fallbacks via
//! clap). Git settings are resolved from the environment once per chat request
//! and never mutated afterwards.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use url::Url;

/// Repository used when `GITHUB_REPO_URL` is not set.
pub const DEFAULT_REPO_URL: &str = "https://github.com/appscript-agent/apps-script-project.git";

/// OpenAI-compatible chat completions endpoint (BYOK mode)
pub const DEFAULT_INFERENCE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";

const REPO_URL_VAR: &str = "GITHUB_REPO_URL";
const TOKEN_VAR: &str = "GITHUB_TOKEN";
const SCRIPT_ID_VAR: &str = "APPS_SCRIPT_ID";

/// Command-line arguments for the server binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "appscript-agent",
    about = "Chat agent backend for editing Google Apps Script projects",
    version
)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "AGENT_BIND", default_value = "127.0.0.1")]
    pub bind: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8787")]
    pub port: u16,

    /// Host directory that backs the sandbox filesystem
    #[arg(long, env = "AGENT_SANDBOX_ROOT")]
    pub sandbox_root: Option<PathBuf>,

    /// Model identifier passed to the inference endpoint
    #[arg(long, env = "AGENT_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Chat completions endpoint
    #[arg(long, env = "AGENT_INFERENCE_URL", default_value = DEFAULT_INFERENCE_URL)]
    pub inference_url: String,
}

impl Args {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.bind, self.port))
    }

    /// Sandbox root, defaulting to a directory under the system temp dir.
    pub fn sandbox_root(&self) -> PathBuf {
        self.sandbox_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("appscript-agent-sandbox"))
    }
}

/// Get the inference API key from the environment.
pub fn inference_api_key() -> Option<String> {
    ["LLM_API_KEY", "OPENROUTER_API_KEY"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}

/// Git settings for one chat request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitToolsConfig {
    pub repo_url: String,
    pub token: Option<String>,
    pub script_id: Option<String>,
}

impl GitToolsConfig {
    /// Resolve from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Resolve with an arbitrary variable lookup. Environment values win; the
    /// repository URL falls back to [`DEFAULT_REPO_URL`]. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            repo_url: get(REPO_URL_VAR).unwrap_or_else(|| DEFAULT_REPO_URL.to_string()),
            token: get(TOKEN_VAR),
            script_id: get(SCRIPT_ID_VAR),
        }
    }

    /// Repository URL with the access token embedded as basic-auth
    /// credentials. Without a token the URL is returned unchanged.
    ///
    /// The token ends up in the sandbox's git config; anything echoed back
    /// to the model goes through [`GitToolsConfig::redact`].
    pub fn authenticated_url(&self) -> Result<String> {
        let Some(token) = self.token.as_deref() else {
            return Ok(self.repo_url.clone());
        };

        let mut url = Url::parse(&self.repo_url)
            .with_context(|| format!("Invalid repository URL '{}'", self.repo_url))?;
        if url.scheme() != "https" {
            return Err(anyhow!(
                "Repository URL must use https to carry credentials (got '{}')",
                url.scheme()
            ));
        }
        url.set_username("x-access-token")
            .map_err(|_| anyhow!("Repository URL cannot carry credentials"))?;
        url.set_password(Some(token))
            .map_err(|_| anyhow!("Repository URL cannot carry credentials"))?;
        Ok(url.to_string())
    }

    /// Replace every occurrence of the access token with `***`, both as
    /// given and in the percent-encoded form it takes inside the URL.
    pub fn redact(&self, text: &str) -> String {
        let Some(token) = self.token.as_deref().filter(|t| !t.is_empty()) else {
            return text.to_string();
        };

        let mut redacted = text.to_string();
        if let Some(encoded) = encoded_password(token).filter(|e| e != token) {
            redacted = redacted.replace(&encoded, "***");
        }
        redacted.replace(token, "***")
    }
}

/// `token` as it appears in the password slot of a URL.
fn encoded_password(token: &str) -> Option<String> {
    let mut url = Url::parse("https://x-access-token@example.com").ok()?;
    url.set_password(Some(token)).ok()?;
    url.password().map(str::to_string)
}
