// Authentication types

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::secret::Secret;

/// Tokens expiring within this margin are never handed out
pub const USABLE_MARGIN_SECS: i64 = 300;

/// Subtracted from the server's `expires_in` before the expiry is stored
pub const EXPIRY_BUFFER_SECS: i64 = 300;

/// Lifetime assumed when the server omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 1800;

/// Margin used by the demand path (`get_token`) and the status view
pub fn usable_margin() -> Duration {
    Duration::seconds(USABLE_MARGIN_SECS)
}

/// The in-memory credential record
///
/// Token and expiry live in one struct, so a token without an expiry
/// (or the reverse) cannot be represented.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedToken {
    pub access_token: String,
    /// Already reduced by `EXPIRY_BUFFER_SECS`; compare against `now` only
    pub expires_at: DateTime<Utc>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Build a token from an authorization response received at `now`
    ///
    /// Fails when `expires_in` does not fit a representable timestamp.
    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self> {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        let expires_at = i64::try_from(expires_in)
            .ok()
            .map(|secs| secs - EXPIRY_BUFFER_SECS)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .with_context(|| format!("expires_in out of range: {}", expires_in))?;

        Ok(Self {
            access_token: response.access_token,
            expires_at,
            issued_at: Some(now),
        })
    }

    /// True when the token is still good past `now + margin`
    pub fn is_valid_for(&self, margin: Duration, now: DateTime<Utc>) -> bool {
        self.expires_at > now + margin
    }
}

/// Authorization endpoint success body
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<u64>,
}

/// Timestamp as found in the token file
///
/// Current writes are RFC 3339. Older files may carry epoch milliseconds
/// or a naive ISO-8601 string in local time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredTimestamp {
    Rfc3339(DateTime<Utc>),
    Naive(NaiveDateTime),
    EpochMillis(i64),
}

impl StoredTimestamp {
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            StoredTimestamp::Rfc3339(dt) => Some(*dt),
            StoredTimestamp::Naive(naive) => Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            StoredTimestamp::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms),
        }
    }
}

/// Token file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedToken {
    pub access_token: String,
    pub expires_at: StoredTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<StoredTimestamp>,
}

impl From<&CachedToken> for PersistedToken {
    fn from(token: &CachedToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            expires_at: StoredTimestamp::Rfc3339(token.expires_at),
            issued_at: token.issued_at.map(StoredTimestamp::Rfc3339),
        }
    }
}

/// Read-only view of the manager state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStatus {
    pub has_token: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_valid: bool,
}

/// Result of one background refresh check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Token still outside the threshold, nothing done
    Fresh,
    /// A new token was acquired
    Refreshed,
}

/// Everything the manager needs to talk to the authorization endpoint
#[derive(Debug, Clone)]
pub struct TokenSettings {
    /// Pre-encoded Basic credentials, sent verbatim
    pub secret: Secret<String>,
    pub auth_url: String,
    pub scope: String,
    pub token_file: PathBuf,
    pub timeout: std::time::Duration,
    pub accept_invalid_certs: bool,
}

/// Background refresh cadence
#[derive(Debug, Clone, Copy)]
pub struct RefreshSchedule {
    /// Normal wake-up interval (default 900s)
    pub interval: std::time::Duration,
    /// Delay before the next check after a failed cycle (default 60s)
    pub retry_interval: std::time::Duration,
    /// Refresh when the token expires within this window (default 600s)
    pub threshold: std::time::Duration,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            interval: std::time::Duration::from_secs(900),
            retry_interval: std::time::Duration::from_secs(60),
            threshold: std::time::Duration::from_secs(600),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_response_bakes_in_buffer() {
        let now = Utc::now();
        let token = CachedToken::from_response(
            TokenResponse {
                access_token: "abc".to_string(),
                expires_in: Some(1800),
            },
            now,
        )
        .unwrap();

        assert_eq!(token.access_token, "abc");
        assert_eq!(token.expires_at, now + Duration::seconds(1500));
        assert_eq!(token.issued_at, Some(now));
    }

    #[test]
    fn test_from_response_default_expiry() {
        let now = Utc::now();
        let token = CachedToken::from_response(
            TokenResponse {
                access_token: "abc".to_string(),
                expires_in: None,
            },
            now,
        )
        .unwrap();

        assert_eq!(token.expires_at, now + Duration::seconds(1500));
    }

    #[test]
    fn test_from_response_rejects_out_of_range_expiry() {
        for expires_in in [100_000_000_000_000_000, i64::MAX as u64, u64::MAX] {
            let result = CachedToken::from_response(
                TokenResponse {
                    access_token: "abc".to_string(),
                    expires_in: Some(expires_in),
                },
                Utc::now(),
            );
            assert!(result.is_err(), "expires_in {} accepted", expires_in);
        }
    }

    #[test]
    fn test_stored_timestamp_formats() {
        let rfc: StoredTimestamp = serde_json::from_str("\"2025-01-12T10:30:00Z\"").unwrap();
        assert_eq!(
            rfc.to_utc().unwrap().to_rfc3339(),
            "2025-01-12T10:30:00+00:00"
        );

        let millis: StoredTimestamp = serde_json::from_str("1736677800000").unwrap();
        assert_eq!(
            millis.to_utc().unwrap().to_rfc3339(),
            "2025-01-12T10:30:00+00:00"
        );

        let naive: StoredTimestamp =
            serde_json::from_str("\"2025-01-12T10:30:00.123456\"").unwrap();
        assert!(matches!(naive, StoredTimestamp::Naive(_)));
        assert!(naive.to_utc().is_some());
    }

    #[test]
    fn test_persisted_token_shape() {
        let now = Utc::now();
        let token = CachedToken {
            access_token: "tok".to_string(),
            expires_at: now,
            issued_at: None,
        };

        let json = serde_json::to_value(PersistedToken::from(&token)).unwrap();
        assert_eq!(json["access_token"], "tok");
        assert!(json["expires_at"].is_string());
        assert!(json.get("issued_at").is_none());
    }

    proptest! {
        #[test]
        fn prop_usable_only_beyond_margin(offset in -7200i64..7200) {
            let now = Utc::now();
            let token = CachedToken {
                access_token: "tok".to_string(),
                expires_at: now + Duration::seconds(offset),
                issued_at: None,
            };
            prop_assert_eq!(token.is_valid_for(usable_margin(), now), offset > USABLE_MARGIN_SECS);
        }
    }
}
