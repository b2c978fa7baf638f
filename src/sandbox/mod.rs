//! Execution sandbox the agent works in.
//!
//! [`Sandbox`] is the opaque command/file service: a platform container in
//! production, [`LocalSandbox`] on a developer machine. [`SandboxOps`] layers
//! the named operations the tools dispatch to on top of it.

mod local;
mod ops;

pub use local::LocalSandbox;
pub use ops::{SandboxOps, DEPLOY_CONFIG_FILE, PUSH_BRANCH, WORK_DIR};

use anyhow::Result;
use async_trait::async_trait;

/// Options for [`Sandbox::checkout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutOptions {
    /// Absolute sandbox path to clone into
    pub target_dir: String,
    /// History depth; 1 for a shallow clone
    pub depth: u32,
}

/// Captured result of a command run inside the sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Remote command/file execution service.
///
/// Paths are absolute paths inside the sandbox. Implementations do not
/// validate them beyond keeping them inside their own filesystem.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Clone `url` into `options.target_dir`, replacing any previous checkout.
    async fn checkout(&self, url: &str, options: &CheckoutOptions) -> Result<()>;

    async fn read_file(&self, path: &str) -> Result<String>;

    /// Overwrite `path` with `content`.
    async fn write_file(&self, path: &str, content: &str) -> Result<()>;

    /// Run `command` with `args`, optionally from `cwd`. A non-zero exit is
    /// reported in [`ExecOutput::exit_code`], not as an error.
    async fn exec(&self, command: &str, args: &[&str], cwd: Option<&str>) -> Result<ExecOutput>;
}
