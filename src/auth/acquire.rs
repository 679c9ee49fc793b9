// Token acquisition
// The only code path that talks to the authorization endpoint

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use uuid::Uuid;

use super::types::{CachedToken, TokenResponse, TokenSettings};

/// Build the HTTP client used for authorization requests
pub fn build_client(settings: &TokenSettings) -> Result<Client> {
    if settings.accept_invalid_certs {
        tracing::warn!("TLS certificate verification is disabled for the authorization endpoint");
    }

    Client::builder()
        .timeout(settings.timeout)
        .danger_accept_invalid_certs(settings.accept_invalid_certs)
        .build()
        .context("Failed to create authorization HTTP client")
}

/// Exchange the authorization key for a new access token
///
/// Every request carries a fresh `RqUID`. Only HTTP 200 counts as success.
pub async fn request_token(client: &Client, settings: &TokenSettings) -> Result<CachedToken> {
    let rq_uid = Uuid::new_v4();
    let authorization = settings.secret.basic_auth_header()?;

    tracing::info!(
        url = %settings.auth_url,
        rq_uid = %rq_uid,
        "Requesting new access token..."
    );

    let form = [("scope", settings.scope.as_str())];

    let response = client
        .post(&settings.auth_url)
        .header(ACCEPT, "application/json")
        .header("RqUID", rq_uid.to_string())
        .header(AUTHORIZATION, authorization)
        .form(&form)
        .send()
        .await
        .context("Failed to send token request")?;

    let status = response.status();
    if status != StatusCode::OK {
        let error_text = response.text().await.unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            rq_uid = %rq_uid,
            body = %error_text,
            "Token request rejected"
        );
        anyhow::bail!("Token request failed: {} - {}", status, error_text);
    }

    let data: TokenResponse = response
        .json()
        .await
        .context("Failed to parse token response")?;

    if data.access_token.is_empty() {
        anyhow::bail!("Token response does not contain access_token");
    }

    let token =
        CachedToken::from_response(data, Utc::now()).context("Failed to parse token response")?;

    tracing::info!(
        rq_uid = %rq_uid,
        "Access token acquired, usable until {}",
        token.expires_at.to_rfc3339()
    );

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Secret;
    use chrono::Duration;
    use mockito::Matcher;

    fn settings(url: String) -> TokenSettings {
        TokenSettings {
            secret: Secret::new("dGVzdDpzZWNyZXQ=".to_string()),
            auth_url: url,
            scope: "GIGACHAT_API_PERS".to_string(),
            token_file: std::path::PathBuf::from("unused.json"),
            timeout: std::time::Duration::from_secs(10),
            accept_invalid_certs: false,
        }
    }

    #[tokio::test]
    async fn test_request_shape_and_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v2/oauth")
            .match_header("authorization", "Basic dGVzdDpzZWNyZXQ=")
            .match_header("accept", "application/json")
            .match_header(
                "rquid",
                Matcher::Regex(
                    "^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[0-9a-f]{4}-[0-9a-f]{12}$".to_string(),
                ),
            )
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::UrlEncoded(
                "scope".to_string(),
                "GIGACHAT_API_PERS".to_string(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "fresh-token", "expires_in": 1800}"#)
            .expect(1)
            .create_async()
            .await;

        let settings = settings(format!("{}/api/v2/oauth", server.url()));
        let client = build_client(&settings).unwrap();
        let before = Utc::now();
        let token = request_token(&client, &settings).await.unwrap();

        mock.assert_async().await;
        assert_eq!(token.access_token, "fresh-token");
        assert!(token.expires_at >= before + Duration::seconds(1500));
        assert!(token.expires_at <= Utc::now() + Duration::seconds(1500));
    }

    #[tokio::test]
    async fn test_missing_expires_in_defaults() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"access_token": "tok"}"#)
            .create_async()
            .await;

        let settings = settings(server.url());
        let client = build_client(&settings).unwrap();
        let before = Utc::now();
        let token = request_token(&client, &settings).await.unwrap();

        assert!(token.expires_at >= before + Duration::seconds(1500));
        assert!(token.expires_at <= Utc::now() + Duration::seconds(1500));
    }

    #[tokio::test]
    async fn test_non_200_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(400)
            .with_body(r#"{"code": 4, "message": "Can't decode 'Authorization' header"}"#)
            .create_async()
            .await;

        let settings = settings(server.url());
        let client = build_client(&settings).unwrap();
        let err = request_token(&client, &settings).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_other_2xx_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(201)
            .with_body(r#"{"access_token": "tok", "expires_in": 1800}"#)
            .create_async()
            .await;

        let settings = settings(server.url());
        let client = build_client(&settings).unwrap();
        assert!(request_token(&client, &settings).await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_body_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let settings = settings(server.url());
        let client = build_client(&settings).unwrap();
        assert!(request_token(&client, &settings).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_access_token_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"access_token": "", "expires_in": 1800}"#)
            .create_async()
            .await;

        let settings = settings(server.url());
        let client = build_client(&settings).unwrap();
        assert!(request_token(&client, &settings).await.is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_expires_in_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"access_token": "tok", "expires_in": 100000000000000000}"#)
            .create_async()
            .await;

        let settings = settings(server.url());
        let client = build_client(&settings).unwrap();
        let err = request_token(&client, &settings).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse token response"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_error() {
        // Nothing listens on port 9 on loopback
        let settings = settings("http://127.0.0.1:9/api/v2/oauth".to_string());
        let client = build_client(&settings).unwrap();
        assert!(request_token(&client, &settings).await.is_err());
    }
}
