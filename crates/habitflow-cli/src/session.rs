use std::path::PathBuf;

use anyhow::{Context, Result};
use habitflow_core::Session;

/// Where the signed-in session is cached between invocations.
pub fn session_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("no config directory on this platform")?;
    Ok(base.join("habitflow").join("session.json"))
}

pub fn load() -> Result<Session> {
    let path = session_path()?;
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("not signed in (no session at {})", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("corrupt session file: {}", path.display()))
}

pub fn save(session: &Session) -> Result<()> {
    let path = session_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(session).context("failed to serialize session")?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn clear() -> Result<()> {
    let path = session_path()?;
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
    }
}
