//! OAuth connection lifecycle
//!
//! `disconnected -> pending_authorization -> connected -> (expired | revoked)`.
//! Only connect and disconnect write to the credential store; `expired` and
//! `revoked` are derived from the stored credential when asked.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::state::{OAuthStateError, OAuthStateSigner};
use crate::credential_store::CredentialStore;
use crate::domain::{ConnectionState, Credential, IntegrationError, ProviderKind};
use crate::providers::{OAuthProvider, ProviderAdapter, ProviderRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error(transparent)]
    InvalidState(#[from] OAuthStateError),

    #[error(transparent)]
    Integration(#[from] IntegrationError),
}

/// URL the user is sent to, plus the state it carries
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationRequest {
    pub provider: ProviderKind,
    pub auth_url: String,
    pub state: ConnectionState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub provider: ProviderKind,
    pub state: ConnectionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<Utc>>,
}

pub struct ConnectionService {
    store: Arc<dyn CredentialStore>,
    registry: Arc<ProviderRegistry>,
    signer: OAuthStateSigner,
}

impl ConnectionService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        registry: Arc<ProviderRegistry>,
        signer: OAuthStateSigner,
    ) -> Self {
        Self {
            store,
            registry,
            signer,
        }
    }

    fn oauth_of(adapter: &dyn ProviderAdapter) -> Result<&dyn OAuthProvider, IntegrationError> {
        adapter.oauth().ok_or_else(|| {
            IntegrationError::configuration(format!(
                "{} does not use per-user authorization",
                adapter.kind()
            ))
        })
    }

    /// `disconnected -> pending_authorization`. Nothing is persisted.
    pub fn authorization_url(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<AuthorizationRequest, ConnectionError> {
        let adapter = self.registry.get(provider)?;
        let oauth = Self::oauth_of(adapter.as_ref())?;

        let state = self.signer.sign(user_id, provider);
        let auth_url = oauth.authorization_url(&state)?;

        Ok(AuthorizationRequest {
            provider,
            auth_url,
            state: ConnectionState::PendingAuthorization,
        })
    }

    /// `pending_authorization -> connected`: exchange the code and store the
    /// credential for the user named in the signed state.
    pub async fn complete_authorization(
        &self,
        provider: ProviderKind,
        code: &str,
        state: &str,
    ) -> Result<Uuid, ConnectionError> {
        let user_id = self.signer.verify(state, provider)?;

        let adapter = self.registry.get(provider)?;
        let oauth = Self::oauth_of(adapter.as_ref())?;
        let grant = oauth.exchange_code(code).await?;

        let mut credential = Credential::from_grant(user_id, provider, grant, Utc::now());

        // Re-consent does not always return a new refresh token
        if credential.refresh_token.is_none() {
            let previous = self
                .store
                .load(user_id, provider)
                .await
                .map_err(IntegrationError::from)?;
            credential.refresh_token = previous.and_then(|p| p.refresh_token);
        }

        self.store
            .save(&credential)
            .await
            .map_err(IntegrationError::from)?;

        tracing::info!(
            user_id = %user_id,
            provider = %provider,
            has_refresh_token = credential.can_refresh(),
            "Provider connected"
        );

        Ok(user_id)
    }

    /// `connected | expired -> disconnected`. Returns whether anything was cleared.
    pub async fn disconnect(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<bool, ConnectionError> {
        let cleared = self
            .store
            .clear(user_id, provider)
            .await
            .map_err(IntegrationError::from)?;

        tracing::info!(user_id = %user_id, provider = %provider, cleared, "Provider disconnected");
        Ok(cleared)
    }

    pub async fn status(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<ConnectionStatus, ConnectionError> {
        let credential = self
            .store
            .load(user_id, provider)
            .await
            .map_err(IntegrationError::from)?;

        Ok(match credential {
            None => ConnectionStatus {
                provider,
                state: ConnectionState::Disconnected,
                expires_at: None,
            },
            Some(credential) => ConnectionStatus {
                provider,
                state: credential.connection_state(Utc::now()),
                expires_at: credential.expires_at,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GoogleConfig, ProviderTimeouts};
    use crate::credential_store::MemoryCredentialStore;
    use crate::domain::SecretString;
    use crate::providers::GoogleCalendarAdapter;
    use mockito::Server;

    fn service(token_base: &str) -> (ConnectionService, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let google = GoogleCalendarAdapter::new(
            reqwest::Client::new(),
            GoogleConfig {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".into(),
                redirect_uri: "http://localhost:8080/api/integrations/google_calendar/callback"
                    .to_string(),
                auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_url: format!("{}/token", token_base),
                calendar_api_url: format!("{}/calendar/v3", token_base),
                time_zone: "Africa/Nairobi".to_string(),
            },
            ProviderTimeouts::default(),
        );
        let registry = ProviderRegistry::new().with_adapter(Arc::new(google));
        let service = ConnectionService::new(
            store.clone(),
            Arc::new(registry),
            OAuthStateSigner::new(&SecretString::from("test-secret")).unwrap(),
        );
        (service, store)
    }

    fn state_from(auth_url: &str) -> String {
        url::Url::parse(auth_url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_flow() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"ya29.a","refresh_token":"1//r","expires_in":3600}"#)
            .create_async()
            .await;

        let (service, store) = service(&server.url());
        let user = Uuid::new_v4();

        let status = service.status(user, ProviderKind::GoogleCalendar).await.unwrap();
        assert_eq!(status.state, ConnectionState::Disconnected);

        let request = service
            .authorization_url(user, ProviderKind::GoogleCalendar)
            .unwrap();
        assert_eq!(request.state, ConnectionState::PendingAuthorization);
        assert!(store.is_empty().await);

        let state = state_from(&request.auth_url);
        let connected_user = service
            .complete_authorization(ProviderKind::GoogleCalendar, "code", &state)
            .await
            .unwrap();
        assert_eq!(connected_user, user);

        let status = service.status(user, ProviderKind::GoogleCalendar).await.unwrap();
        assert_eq!(status.state, ConnectionState::Connected);

        assert!(service.disconnect(user, ProviderKind::GoogleCalendar).await.unwrap());
        let status = service.status(user, ProviderKind::GoogleCalendar).await.unwrap();
        assert_eq!(status.state, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_previous_refresh_token() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/token")
            .with_status(200)
            .with_body(r#"{"access_token":"ya29.second","expires_in":3600}"#)
            .create_async()
            .await;

        let (service, store) = service(&server.url());
        let user = Uuid::new_v4();
        store
            .save(&Credential {
                user_id: user,
                provider: ProviderKind::GoogleCalendar,
                access_token: "ya29.first".into(),
                refresh_token: Some("1//original".into()),
                expires_at: None,
            })
            .await
            .unwrap();

        let request = service
            .authorization_url(user, ProviderKind::GoogleCalendar)
            .unwrap();
        service
            .complete_authorization(
                ProviderKind::GoogleCalendar,
                "code",
                &state_from(&request.auth_url),
            )
            .await
            .unwrap();

        let saved = store
            .load(user, ProviderKind::GoogleCalendar)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.access_token.expose(), "ya29.second");
        assert_eq!(saved.refresh_token.unwrap().expose(), "1//original");
    }

    #[tokio::test]
    async fn test_forged_state_is_rejected_before_exchange() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/token")
            .expect(0)
            .create_async()
            .await;

        let (service, store) = service(&server.url());
        let err = service
            .complete_authorization(
                ProviderKind::GoogleCalendar,
                "code",
                &Uuid::new_v4().to_string(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectionError::InvalidState(_)));
        assert!(store.is_empty().await);
        token.assert_async().await;
    }

    #[tokio::test]
    async fn test_service_provider_has_no_authorization() {
        let (service, _) = service("http://127.0.0.1:9");
        let err = service
            .authorization_url(Uuid::new_v4(), ProviderKind::Paystack)
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Integration(IntegrationError::Configuration(_))
        ));
    }
}
