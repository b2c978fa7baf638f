//! Input guard for everything the model asks the sandbox to touch.
//!
//! The allow-list below is the only authorization boundary: the sandbox
//! facade trusts whatever file name it is handed, so every caller must run
//! names through [`validate_file_name`] first.

/// Files the agent may read or write inside the cloned project.
pub const ALLOWED_FILES: &[&str] = &["Code.js", "index.html", "appsscript.json"];

/// Maximum commit message length, in characters.
pub const MAX_COMMIT_MESSAGE_LEN: usize = 500;

/// Used when a commit message is empty after sanitizing.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update via Apps Script agent";

/// Returns true only for allow-listed names with no path components.
pub fn validate_file_name(name: &str) -> bool {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return false;
    }
    ALLOWED_FILES.contains(&name)
}

/// Make a model-supplied commit message safe to hand to git.
///
/// Truncates to [`MAX_COMMIT_MESSAGE_LEN`] characters, strips angle brackets
/// (tool output is rendered as markup downstream), trims, and falls back to
/// [`DEFAULT_COMMIT_MESSAGE`] when nothing is left.
pub fn sanitize_commit_message(message: &str) -> String {
    let cleaned: String = message
        .chars()
        .take(MAX_COMMIT_MESSAGE_LEN)
        .filter(|c| *c != '<' && *c != '>')
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        DEFAULT_COMMIT_MESSAGE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Human-readable allow-list for error messages.
pub fn allowed_files_display() -> String {
    ALLOWED_FILES.join(", ")
}
