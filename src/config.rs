use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{RefreshSchedule, Secret, TokenManager, TokenSettings};
use crate::http_client::AuthorizedClient;

/// Default authorization endpoint
pub const DEFAULT_AUTH_URL: &str = "https://ngw.devices.sberbank.ru:9443/api/v2/oauth";

/// GigaChat token service
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Server host address
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Server port
    #[arg(short, long, env = "SERVER_PORT", default_value = "5000")]
    pub port: u16,

    /// Authorization key (Base64 of client_id:client_secret)
    #[arg(short = 'k', long, env = "GIGACHAT_AUTHORIZATION_KEY", hide_env_values = true)]
    pub auth_key: Option<String>,

    /// Path to the token cache file
    #[arg(short = 'f', long, env = "TOKEN_FILE", default_value = "gigachat_token.json")]
    pub token_file: String,

    /// OAuth endpoint that issues access tokens
    #[arg(long, env = "GIGACHAT_AUTH_URL", default_value = DEFAULT_AUTH_URL)]
    pub auth_url: String,

    /// Scope requested with every token
    #[arg(long, env = "GIGACHAT_SCOPE", default_value = "GIGACHAT_API_PERS")]
    pub scope: String,

    /// Accept invalid TLS certificates from the authorization endpoint
    #[arg(long, env = "GIGACHAT_INSECURE_TLS")]
    pub insecure_tls: bool,

    /// Authorization request timeout in seconds
    #[arg(long, env = "AUTH_TIMEOUT", default_value = "10")]
    pub auth_timeout: u64,

    /// API request timeout in seconds (for clients built with `Config::authorized_client`)
    #[arg(long, env = "API_TIMEOUT", default_value = "30")]
    pub api_timeout: u64,

    /// Background refresh interval in seconds
    #[arg(long, env = "TOKEN_REFRESH_INTERVAL", default_value = "900")]
    pub refresh_interval: u64,

    /// Delay after a failed background refresh in seconds
    #[arg(long, env = "TOKEN_REFRESH_RETRY_INTERVAL", default_value = "60")]
    pub refresh_retry_interval: u64,

    /// Background refresh kicks in when the token expires within this many seconds
    #[arg(long, env = "TOKEN_BACKGROUND_THRESHOLD", default_value = "600")]
    pub background_threshold: u64,

    /// Key required on /token routes (unguarded when unset)
    #[arg(long, env = "ADMIN_API_KEY", hide_env_values = true)]
    pub admin_api_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Authorization
    pub auth_key: Secret<String>,
    pub auth_url: String,
    pub scope: String,
    pub insecure_tls: bool,
    pub token_file: PathBuf,

    // Timeouts
    pub auth_timeout: u64,
    pub api_timeout: u64,

    // Background refresh
    pub refresh_interval: u64,
    pub refresh_retry_interval: u64,
    pub background_threshold: u64,

    // Admin routes
    pub admin_api_key: Option<Secret<String>>,

    pub log_level: String,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let auth_key = args
            .auth_key
            .filter(|key| !key.trim().is_empty())
            .context(
                "GIGACHAT_AUTHORIZATION_KEY is required (use -k or set GIGACHAT_AUTHORIZATION_KEY env var)",
            )?;

        Ok(Config {
            server_host: args.host,
            server_port: args.port,
            auth_key: Secret::new(auth_key),
            auth_url: args.auth_url,
            scope: args.scope,
            insecure_tls: args.insecure_tls,
            token_file: expand_tilde(&args.token_file),
            auth_timeout: args.auth_timeout,
            api_timeout: args.api_timeout,
            refresh_interval: args.refresh_interval,
            refresh_retry_interval: args.refresh_retry_interval,
            background_threshold: args.background_threshold,
            admin_api_key: args
                .admin_api_key
                .filter(|key| !key.is_empty())
                .map(Secret::new),
            log_level: args.log_level,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.auth_url.starts_with("https://") && !self.auth_url.starts_with("http://") {
            anyhow::bail!("GIGACHAT_AUTH_URL must be an http(s) URL: {}", self.auth_url);
        }

        if self.scope.trim().is_empty() {
            anyhow::bail!("GIGACHAT_SCOPE must not be empty");
        }

        if self.auth_timeout == 0 || self.api_timeout == 0 {
            anyhow::bail!("AUTH_TIMEOUT and API_TIMEOUT must be positive");
        }

        if self.refresh_interval == 0 || self.refresh_retry_interval == 0 {
            anyhow::bail!("TOKEN_REFRESH_INTERVAL and TOKEN_REFRESH_RETRY_INTERVAL must be positive");
        }

        Ok(())
    }

    /// Inputs for the token manager
    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            secret: self.auth_key.clone(),
            auth_url: self.auth_url.clone(),
            scope: self.scope.clone(),
            token_file: self.token_file.clone(),
            timeout: Duration::from_secs(self.auth_timeout),
            accept_invalid_certs: self.insecure_tls,
        }
    }

    /// Bearer-token client for GigaChat API calls, bounded by `API_TIMEOUT`
    ///
    /// The service itself makes no API calls; embedders use this to share
    /// the manager's token.
    pub fn authorized_client(&self, token_manager: Arc<TokenManager>) -> Result<AuthorizedClient> {
        AuthorizedClient::new(token_manager, self.api_timeout)
    }

    /// Background refresh cadence
    pub fn refresh_schedule(&self) -> RefreshSchedule {
        RefreshSchedule {
            interval: Duration::from_secs(self.refresh_interval),
            retry_interval: Duration::from_secs(self.refresh_retry_interval),
            threshold: Duration::from_secs(self.background_threshold),
        }
    }
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
