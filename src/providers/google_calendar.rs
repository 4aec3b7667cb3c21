//! Google Calendar adapter
//!
//! Per-user OAuth2 credentials (authorization code + refresh token) and
//! billing reminders written to the user's primary calendar.

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::descriptor::{AuthScheme, CredentialSource, ProviderDescriptor};
use super::http::{ProviderHttp, TokenResponse};
use super::{OAuthProvider, ProviderAdapter, ProviderSession};
use crate::config::{GoogleConfig, ProviderTimeouts};
use crate::domain::{
    CalendarEventParams, IntegrationError, Operation, ProviderKind, SecretString, TokenGrant,
};

const SCOPES: &str =
    "https://www.googleapis.com/auth/calendar https://www.googleapis.com/auth/calendar.events";

/// Email reminder one day ahead, popup one hour ahead
const EMAIL_REMINDER_MINUTES: u32 = 1440;
const POPUP_REMINDER_MINUTES: u32 = 60;

pub struct GoogleCalendarAdapter {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
    /// Token endpoint calls authenticate with the app's client secret
    token_http: ProviderHttp,
    config: GoogleConfig,
    timeouts: ProviderTimeouts,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

impl GoogleCalendarAdapter {
    pub fn new(client: reqwest::Client, config: GoogleConfig, timeouts: ProviderTimeouts) -> Self {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::GoogleCalendar,
            display_name: "Google Calendar",
            base_url: config.calendar_api_url.clone(),
            auth_scheme: AuthScheme::Bearer,
            credential_source: CredentialSource::User,
            units: None,
            operations: &[Operation::WriteCalendarEvent],
        };
        let http = ProviderHttp::new(
            client.clone(),
            ProviderKind::GoogleCalendar,
            CredentialSource::User,
        );
        let token_http =
            ProviderHttp::new(client, ProviderKind::GoogleCalendar, CredentialSource::Service);

        Self {
            descriptor,
            http,
            token_http,
            config,
            timeouts,
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenGrant, IntegrationError> {
        let request = self.token_http.client().post(&self.config.token_url).form(form);
        let response: TokenResponse = self
            .token_http
            .send_json(request, self.timeouts.auth)
            .await?;
        Ok(response.into_grant())
    }
}

/// Event body for a subscription billing reminder.
pub fn event_body(params: &CalendarEventParams, time_zone: &str) -> serde_json::Value {
    let mut description = match params.amount {
        Some(amount) => format!(
            "Subscription payment of {} {:.2} is due.",
            params.currency, amount
        ),
        None => "Subscription payment is due.".to_string(),
    };
    if let Some(extra) = params.description.as_deref().filter(|d| !d.is_empty()) {
        description.push_str("\n\n");
        description.push_str(extra);
    }

    json!({
        "summary": format!("{} Payment Due", params.title),
        "description": description,
        "start": {
            "dateTime": params.starts_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            "timeZone": time_zone,
        },
        "end": {
            "dateTime": params.ends_at().to_rfc3339_opts(SecondsFormat::Secs, true),
            "timeZone": time_zone,
        },
        "reminders": {
            "useDefault": false,
            "overrides": [
                { "method": "email", "minutes": EMAIL_REMINDER_MINUTES },
                { "method": "popup", "minutes": POPUP_REMINDER_MINUTES },
            ],
        },
    })
}

#[async_trait]
impl ProviderAdapter for GoogleCalendarAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn write_calendar_event(
        &self,
        session: &ProviderSession,
        params: &CalendarEventParams,
    ) -> Result<String, IntegrationError> {
        let request = self
            .http
            .client()
            .post(self.descriptor.endpoint("calendars/primary/events"))
            .bearer_auth(session.access_token.expose())
            .json(&event_body(params, &self.config.time_zone));

        let created: CreatedEvent = self.http.send_json(request, self.timeouts.calendar).await?;

        tracing::info!(event_id = %created.id, "Created Google Calendar event");
        Ok(created.id)
    }

    fn oauth(&self) -> Option<&dyn OAuthProvider> {
        Some(self)
    }
}

#[async_trait]
impl OAuthProvider for GoogleCalendarAdapter {
    fn authorization_url(&self, state: &str) -> Result<String, IntegrationError> {
        let url = Url::parse_with_params(
            &self.config.auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("state", state),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| IntegrationError::configuration(format!("invalid GOOGLE_AUTH_URL: {}", e)))?;

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, IntegrationError> {
        self.token_request(&[
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, IntegrationError> {
        self.token_request(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose()),
            ("refresh_token", refresh_token.expose()),
            ("grant_type", "refresh_token"),
        ])
        .await
        .map_err(|err| match err {
            // invalid_grant comes back as 400
            IntegrationError::ProviderRejected { .. } => IntegrationError::ReauthorizationRequired {
                provider: ProviderKind::GoogleCalendar,
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CurrencyCode;
    use chrono::{TimeZone, Utc};
    use mockito::{Matcher, Server};
    use rust_decimal_macros::dec;

    fn config(base: &str) -> GoogleConfig {
        GoogleConfig {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".into(),
            redirect_uri: "http://localhost:3000/api/auth/google/callback".to_string(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: format!("{}/token", base),
            calendar_api_url: format!("{}/calendar/v3", base),
            time_zone: "Africa/Nairobi".to_string(),
        }
    }

    fn adapter(base: &str) -> GoogleCalendarAdapter {
        GoogleCalendarAdapter::new(reqwest::Client::new(), config(base), ProviderTimeouts::default())
    }

    #[test]
    fn test_authorization_url() {
        let adapter = adapter("http://localhost");
        let url = adapter.authorization_url("state-123").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "client-id");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(pairs["state"], "state-123");
        assert!(pairs["scope"].contains("calendar.events"));
    }

    #[test]
    fn test_event_body() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let params = CalendarEventParams::billing_reminder("Netflix", start)
            .with_amount(dec!(1100), CurrencyCode::KES)
            .with_description("Premium plan");

        let body = event_body(&params, "Africa/Nairobi");
        assert_eq!(body["summary"], "Netflix Payment Due");
        assert_eq!(
            body["description"],
            "Subscription payment of KES 1100.00 is due.\n\nPremium plan"
        );
        assert_eq!(body["start"]["dateTime"], "2026-03-01T09:00:00Z");
        assert_eq!(body["end"]["dateTime"], "2026-03-01T10:00:00Z");
        assert_eq!(body["reminders"]["overrides"][0]["minutes"], 1440);
        assert_eq!(body["reminders"]["overrides"][1]["method"], "popup");
    }

    #[tokio::test]
    async fn test_write_calendar_event() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .match_header("authorization", "Bearer user-token")
            .match_body(Matcher::PartialJson(json!({ "summary": "Spotify Payment Due" })))
            .with_status(200)
            .with_body(r#"{"id":"evt_abc","status":"confirmed"}"#)
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let params = CalendarEventParams::billing_reminder("Spotify", Utc::now());
        let event_id = adapter
            .write_calendar_event(&ProviderSession::new("user-token"), &params)
            .await
            .unwrap();

        assert_eq!(event_id, "evt_abc");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_write_event_with_revoked_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/calendar/v3/calendars/primary/events")
            .with_status(401)
            .with_body(r#"{"error":{"code":401,"message":"Invalid Credentials"}}"#)
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let params = CalendarEventParams::billing_reminder("Spotify", Utc::now());
        let err = adapter
            .write_calendar_event(&ProviderSession::new("stale"), &params)
            .await
            .unwrap_err();

        assert!(matches!(err, IntegrationError::ReauthorizationRequired { .. }));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "auth-code".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"access_token":"ya29.new","refresh_token":"1//refresh","expires_in":3599,"token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let grant = adapter(&server.url()).exchange_code("auth-code").await.unwrap();
        assert_eq!(grant.access_token.expose(), "ya29.new");
        assert_eq!(grant.refresh_token.unwrap().expose(), "1//refresh");
        assert_eq!(grant.expires_in, Some(3599));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant_requires_reauthorization() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .refresh(&SecretString::from("revoked"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::ReauthorizationRequired { .. }));
    }

    #[tokio::test]
    async fn test_rejected_client_secret_is_configuration_error() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client","error_description":"Unauthorized"}"#)
            .expect(2)
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let err = adapter
            .refresh(&SecretString::from("refresh"))
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Configuration(_)));

        let err = adapter.exchange_code("auth-code").await.unwrap_err();
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_refresh_server_error_is_transient() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(503)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .refresh(&SecretString::from("refresh"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
