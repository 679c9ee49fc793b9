use anyhow::Context;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenManager;
use crate::error::ApiError;

/// HTTP client for calls that need a bearer token
///
/// Attaches the current access token to every request. When the API
/// answers 401 the cached token is considered revoked: a forced refresh
/// is performed and the request is retried once with the new token.
pub struct AuthorizedClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    token_manager: Arc<TokenManager>,
}

impl AuthorizedClient {
    /// Create a new client; `request_timeout` bounds each attempt in seconds
    pub fn new(token_manager: Arc<TokenManager>, request_timeout: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            token_manager,
        })
    }

    /// Execute a request with the current token, retrying once after a 401
    pub async fn execute(&self, request: Request) -> Result<Response, ApiError> {
        let token = self
            .token_manager
            .get_token()
            .await
            .map_err(|e| ApiError::TokenUnavailable(format!("{:#}", e)))?;

        let response = self.send_with_token(&request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::check_status(response).await;
        }

        tracing::warn!(url = %request.url(), "Received 401, forcing token refresh and retrying...");

        let token = self
            .token_manager
            .force_refresh()
            .await
            .map_err(|e| ApiError::AuthError(format!("Token refresh failed: {:#}", e)))?;

        let response = self.send_with_token(&request, &token).await?;
        Self::check_status(response).await
    }

    async fn send_with_token(&self, request: &Request, token: &str) -> Result<Response, ApiError> {
        let mut req = request.try_clone().ok_or_else(|| {
            ApiError::Internal(anyhow::anyhow!("Request body is not cloneable"))
        })?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Access token is not a valid header value")?;
        req.headers_mut().insert(AUTHORIZATION, bearer);

        let url = req.url().clone();
        tracing::debug!(method = %req.method(), url = %url, "Sending HTTP request");

        self.client.execute(req).await.map_err(|e| {
            // Categorize the error for better debugging
            let error_kind = if e.is_timeout() {
                "timeout"
            } else if e.is_connect() {
                "connection_failed"
            } else if e.is_body() {
                "body_error"
            } else {
                "unknown"
            };

            tracing::error!(
                error_kind = error_kind,
                error = %e,
                url = %url,
                "HTTP request failed"
            );

            ApiError::Internal(anyhow::anyhow!(
                "HTTP request failed: {} (kind: {})",
                e,
                error_kind
            ))
        })
    }

    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let url = response.url().clone();
        let error_text = response.text().await.unwrap_or_default();

        tracing::error!(
            status = status.as_u16(),
            url = %url,
            response_body = %error_text,
            "HTTP request failed with error response"
        );

        Err(ApiError::UpstreamError {
            status: status.as_u16(),
            message: error_text,
        })
    }

    /// Get the underlying HTTP client, for building requests
    pub fn client(&self) -> &Client {
        &self.client
    }
}
