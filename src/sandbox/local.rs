use super::{CheckoutOptions, ExecOutput, Sandbox};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Sandbox backed by a directory on the host.
///
/// Sandbox paths are absolute (`/workspace/repo/Code.js`) and are mapped under
/// `root` (`<root>/workspace/repo/Code.js`). Commands run as host processes
/// with git prompts disabled, and git repository discovery stops at `root` so
/// a missing checkout never resolves to a repository enclosing the sandbox.
#[derive(Debug, Clone)]
pub struct LocalSandbox {
    root: PathBuf,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Map a sandbox path onto the host. Relative paths and `..` are refused
    /// so nothing resolves outside `root`.
    pub fn host_path(&self, sandbox_path: &str) -> Result<PathBuf> {
        let path = Path::new(sandbox_path);
        if !path.is_absolute() {
            return Err(anyhow!("Sandbox path must be absolute: {}", sandbox_path));
        }

        let mut host = self.root.clone();
        for component in path.components() {
            match component {
                Component::RootDir => {}
                Component::Normal(part) => host.push(part),
                _ => {
                    return Err(anyhow!(
                        "Sandbox path may not contain '{}': {}",
                        component.as_os_str().to_string_lossy(),
                        sandbox_path
                    ))
                }
            }
        }
        Ok(host)
    }

    fn env_overrides(&self) -> [(&'static str, OsString); 3] {
        [
            ("GIT_TERMINAL_PROMPT", OsString::from("0")),
            ("GIT_ASKPASS", OsString::from("/bin/true")),
            ("GIT_CEILING_DIRECTORIES", self.root.clone().into_os_string()),
        ]
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn checkout(&self, url: &str, options: &CheckoutOptions) -> Result<()> {
        let target = self.host_path(&options.target_dir)?;

        if target.exists() {
            tokio::fs::remove_dir_all(&target).await.with_context(|| {
                format!("Failed to clear existing checkout '{}'", target.display())
            })?;
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create sandbox directory '{}'", parent.display())
            })?;
        }

        let depth = options.depth.to_string();
        let target_arg = target.to_string_lossy().to_string();
        let output = self
            .exec(
                "git",
                &["clone", "--depth", depth.as_str(), url, target_arg.as_str()],
                None,
            )
            .await?;

        if !output.success() {
            return Err(anyhow!(
                "git clone failed (exit code {}): {}",
                output.exit_code,
                output.stderr.trim()
            ));
        }

        info!(target = %options.target_dir, depth = options.depth, "checked out repository");
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<String> {
        let host = self.host_path(path)?;
        tokio::fs::read_to_string(&host)
            .await
            .with_context(|| format!("File not found or unreadable: {}", path))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        let host = self.host_path(path)?;
        if let Some(parent) = host.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&host, content)
            .await
            .with_context(|| format!("Failed to write {}", path))
    }

    async fn exec(&self, command: &str, args: &[&str], cwd: Option<&str>) -> Result<ExecOutput> {
        let dir = match cwd {
            Some(cwd) => self.host_path(cwd)?,
            None => self.root.clone(),
        };
        if !dir.is_dir() {
            return Err(anyhow!(
                "Working directory does not exist: {} (clone the repository first)",
                cwd.unwrap_or("/")
            ));
        }

        let mut cmd = Command::new(command);
        cmd.args(args).current_dir(&dir).kill_on_drop(true);
        cmd.env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
        for (key, value) in self.env_overrides() {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to start {}", command))?;

        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
