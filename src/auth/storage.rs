// Token file persistence
// The file mirrors the in-memory token; losing it only costs a warm start

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::types::{CachedToken, PersistedToken};

/// Read the token file
///
/// Returns `Ok(None)` when the file does not exist. Malformed content or a
/// timestamp that cannot be interpreted is an error.
pub fn load_from_file(path: &Path) -> Result<Option<CachedToken>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read token file: {}", path.display()))?;

    let persisted: PersistedToken = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse token file: {}", path.display()))?;

    if persisted.access_token.is_empty() {
        anyhow::bail!("Token file contains an empty access_token");
    }

    let expires_at = persisted
        .expires_at
        .to_utc()
        .context("Token file contains an unrepresentable expires_at")?;

    Ok(Some(CachedToken {
        access_token: persisted.access_token,
        expires_at,
        issued_at: persisted.issued_at.and_then(|ts| ts.to_utc()),
    }))
}

/// Write the token file atomically (temp file + rename)
pub async fn save_to_file(path: &Path, token: &CachedToken) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(&PersistedToken::from(token))
        .context("Failed to serialize token")?;

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, json.as_bytes())
        .await
        .with_context(|| format!("Failed to write temp token file: {}", tmp.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .with_context(|| format!("Failed to set permissions on {}", tmp.display()))?;
    }

    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move token file into place: {}", path.display()))?;

    tracing::debug!(path = %path.display(), "Token saved to file");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
