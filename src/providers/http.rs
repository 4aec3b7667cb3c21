//! Outbound provider HTTP
//!
//! Sends adapter requests with a bounded timeout and classifies every
//! failure into `IntegrationError` before it leaves the adapter.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use super::descriptor::CredentialSource;
use crate::domain::{CurrencyCode, IntegrationError, ProviderKind, SecretString, TokenGrant};

/// Longest provider body excerpt kept in an error message
const MAX_BODY_EXCERPT: usize = 200;

/// HTTP helper bound to one provider
#[derive(Debug, Clone)]
pub struct ProviderHttp {
    client: reqwest::Client,
    provider: ProviderKind,
    source: CredentialSource,
}

impl ProviderHttp {
    pub fn new(client: reqwest::Client, provider: ProviderKind, source: CredentialSource) -> Self {
        Self {
            client,
            provider,
            source,
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send and return the body of a 2xx response.
    pub async fn send(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<String, IntegrationError> {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;

        if !status.is_success() {
            tracing::warn!(
                provider = %self.provider,
                status = %status,
                "Provider returned an error status"
            );
            return Err(classify_status(self.provider, self.source, status, &body));
        }

        Ok(body)
    }

    /// Send and decode a 2xx JSON response.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<T, IntegrationError> {
        let body = self.send(request, timeout).await?;
        self.decode(&body)
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T, IntegrationError> {
        serde_json::from_str(body).map_err(|e| {
            tracing::warn!(provider = %self.provider, error = %e, "Undecodable provider response");
            IntegrationError::transient(self.provider, format!("unexpected response: {}", e))
        })
    }

    fn transport_error(&self, err: reqwest::Error, timeout: Duration) -> IntegrationError {
        if err.is_timeout() {
            return IntegrationError::timeout(self.provider, timeout);
        }
        // URLs can carry query parameters; keep them out of messages
        let err = err.without_url();
        IntegrationError::transient(self.provider, format!("request failed: {}", err))
    }
}

/// Map a non-success status to the integration taxonomy.
pub fn classify_status(
    provider: ProviderKind,
    source: CredentialSource,
    status: StatusCode,
    body: &str,
) -> IntegrationError {
    let message = format!("{} {}", status.as_u16(), error_excerpt(body));

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => match source {
            CredentialSource::User => IntegrationError::ReauthorizationRequired { provider },
            CredentialSource::Service => IntegrationError::configuration(format!(
                "{} rejected the service credentials ({})",
                provider,
                status.as_u16()
            )),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            IntegrationError::transient(provider, message)
        }
        s if s.is_server_error() => IntegrationError::transient(provider, message),
        s => IntegrationError::rejected(provider, Some(s.as_u16()), message),
    }
}

/// Pull a human-readable message out of a provider error body.
fn error_excerpt(body: &str) -> String {
    let extracted = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            ["error_description", "errorMessage", "message", "error"]
                .iter()
                .find_map(|key| match json.get(*key) {
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(serde_json::Value::Object(obj)) => obj
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string),
                    _ => None,
                })
        });

    truncate(extracted.as_deref().unwrap_or(body).trim(), MAX_BODY_EXCERPT)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Parse a provider currency field into an ISO code.
pub fn parse_currency(provider: ProviderKind, raw: &str) -> Result<CurrencyCode, IntegrationError> {
    CurrencyCode::new(raw.trim()).map_err(|_| {
        IntegrationError::transient(provider, format!("unexpected currency code '{}'", raw))
    })
}

/// OAuth2 token endpoint response (authorization code, refresh, client credentials).
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Some providers send this as a string
    #[serde(default)]
    pub expires_in: Option<serde_json::Value>,
}

impl TokenResponse {
    pub fn into_grant(self) -> TokenGrant {
        let expires_in = match self.expires_in {
            Some(serde_json::Value::Number(n)) => n.as_i64(),
            Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };

        TokenGrant {
            access_token: SecretString::from(self.access_token),
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unauthorized_by_source() {
        let err = classify_status(
            ProviderKind::GoogleCalendar,
            CredentialSource::User,
            StatusCode::UNAUTHORIZED,
            "",
        );
        assert!(matches!(err, IntegrationError::ReauthorizationRequired { .. }));

        let err = classify_status(
            ProviderKind::Paystack,
            CredentialSource::Service,
            StatusCode::UNAUTHORIZED,
            r#"{"status":false,"message":"Invalid key"}"#,
        );
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }

    #[test]
    fn test_classify_transient_statuses() {
        for status in [
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            let err = classify_status(ProviderKind::Stripe, CredentialSource::Service, status, "");
            assert!(err.is_retryable(), "{} should be transient", status);
        }
    }

    #[test]
    fn test_classify_rejected_extracts_message() {
        let err = classify_status(
            ProviderKind::Mpesa,
            CredentialSource::Service,
            StatusCode::BAD_REQUEST,
            r#"{"requestId":"1","errorCode":"400.002.02","errorMessage":"Bad Request - Invalid Amount"}"#,
        );
        match err {
            IntegrationError::ProviderRejected { status, message, .. } => {
                assert_eq!(status, Some(400));
                assert_eq!(message, "400 Bad Request - Invalid Amount");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        let err = classify_status(
            ProviderKind::Flutterwave,
            CredentialSource::Service,
            StatusCode::UNPROCESSABLE_ENTITY,
            &body,
        );
        assert!(err.to_string().len() < 300);
    }

    #[test]
    fn test_token_response_string_expiry() {
        let response: TokenResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":"3599"}"#).unwrap();
        let grant = response.into_grant();
        assert_eq!(grant.expires_in, Some(3599));
        assert!(grant.refresh_token.is_none());
    }

    #[test]
    fn test_token_response_numeric_expiry() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","refresh_token":"r","expires_in":3600,"token_type":"Bearer"}"#,
        )
        .unwrap();
        let grant = response.into_grant();
        assert_eq!(grant.expires_in, Some(3600));
        assert_eq!(grant.refresh_token.unwrap().expose(), "r");
    }
}
