use std::path::PathBuf;

/// Root of the session log store: `$CLAUDE_DATA_DIR` when set, otherwise
/// `~/.claude/projects`.
pub fn default_data_path() -> PathBuf {
    if let Ok(path) = std::env::var("CLAUDE_DATA_DIR") {
        return PathBuf::from(path);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".claude").join("projects");
    }
    PathBuf::from(".claude").join("projects")
}
