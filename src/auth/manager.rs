use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use reqwest::Client;
use std::path::Path;
use tokio::sync::Mutex;

use super::acquire;
use super::storage;
use super::types::{usable_margin, CachedToken, RefreshOutcome, TokenSettings, TokenStatus};

/// Token manager
/// Owns the access token, its file mirror and the acquisition protocol.
///
/// All reads and writes of the token go through one async mutex. The lock
/// is held across the network call on the acquisition path, so concurrent
/// callers queue behind a single in-flight acquisition instead of issuing
/// their own. This trades latency under contention for never requesting
/// two tokens at once.
pub struct TokenManager {
    /// Current token, `None` until the first acquisition or warm start
    token: Mutex<Option<CachedToken>>,

    settings: TokenSettings,

    /// HTTP client for authorization requests
    client: Client,
}

impl TokenManager {
    /// Create a manager and warm-start it from the token file if possible
    pub fn new(settings: TokenSettings) -> Result<Self> {
        if settings.secret.is_blank() {
            anyhow::bail!("Authorization key must not be empty");
        }

        let client = acquire::build_client(&settings)?;
        let token = load_cached_token(&settings.token_file);

        Ok(Self {
            token: Mutex::new(token),
            settings,
            client,
        })
    }

    /// Acquire a token and install it; caller holds the lock
    async fn acquire_locked(&self, slot: &mut Option<CachedToken>) -> Result<String> {
        let token = match acquire::request_token(&self.client, &self.settings).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("Token acquisition failed: {:#}", e);
                return Err(e);
            }
        };

        if let Err(e) = storage::save_to_file(&self.settings.token_file, &token).await {
            tracing::warn!("Failed to persist token, continuing in memory: {:#}", e);
        }

        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    /// Get a usable access token, acquiring one if missing or expiring
    pub async fn get_token(&self) -> Result<String> {
        let mut slot = self.token.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_valid_for(usable_margin(), Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        tracing::info!("Access token missing or expiring soon, requesting a new one");
        self.acquire_locked(&mut slot)
            .await
            .context("No access token available")
    }

    /// Acquire a new token regardless of the cached one's validity
    ///
    /// Shares the critical section with `get_token` and the background
    /// loop. When several refreshes race, they run one after another and
    /// the last one to finish determines both the cached and the persisted
    /// token.
    pub async fn force_refresh(&self) -> Result<String> {
        tracing::info!("Forced token refresh");
        let mut slot = self.token.lock().await;
        self.acquire_locked(&mut slot)
            .await
            .context("Forced token refresh failed")
    }

    /// Refresh if the token is missing or expires within `threshold`
    pub async fn refresh_if_needed(&self, threshold: std::time::Duration) -> Result<RefreshOutcome> {
        let threshold =
            Duration::from_std(threshold).context("Refresh threshold out of range")?;
        let mut slot = self.token.lock().await;

        if let Some(token) = slot.as_ref() {
            if token.is_valid_for(threshold, Utc::now()) {
                tracing::debug!(
                    "Token valid until {}, no background refresh needed",
                    token.expires_at.to_rfc3339()
                );
                return Ok(RefreshOutcome::Fresh);
            }
        }

        tracing::info!("Background token refresh");
        self.acquire_locked(&mut slot).await?;
        Ok(RefreshOutcome::Refreshed)
    }

    /// Snapshot of the current token state
    pub async fn status(&self) -> TokenStatus {
        let slot = self.token.lock().await;

        match slot.as_ref() {
            Some(token) => TokenStatus {
                has_token: true,
                expires_at: Some(token.expires_at),
                is_valid: token.is_valid_for(usable_margin(), Utc::now()),
            },
            None => TokenStatus {
                has_token: false,
                expires_at: None,
                is_valid: false,
            },
        }
    }
}

/// Read the token file, keeping the token only if it is still usable
fn load_cached_token(path: &Path) -> Option<CachedToken> {
    match storage::load_from_file(path) {
        Ok(Some(token)) if token.is_valid_for(usable_margin(), Utc::now()) => {
            tracing::info!(
                "Token loaded from {}, valid until {}",
                path.display(),
                token.expires_at.to_rfc3339()
            );
            Some(token)
        }
        Ok(Some(token)) => {
            tracing::info!(
                "Token in {} expired at {}, a new one will be requested",
                path.display(),
                token.expires_at.to_rfc3339()
            );
            None
        }
        Ok(None) => {
            tracing::info!("No token file at {}", path.display());
            None
        }
        Err(e) => {
            tracing::error!("Failed to load token from file: {:#}", e);
            None
        }
    }
}
