//! Token Refresh Manager
//!
//! Hands out a currently-valid access token for (user, provider), refreshing
//! through the provider's OAuth adapter when the stored one is near expiry.
//! Refreshes for the same key are serialized; different keys never block
//! each other.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::credential_store::CredentialStore;
use crate::domain::{AccessToken, Credential, IntegrationError, ProviderKind};
use crate::providers::ProviderRegistry;

type RefreshKey = (Uuid, ProviderKind);

pub struct TokenRefreshManager {
    store: Arc<dyn CredentialStore>,
    registry: Arc<ProviderRegistry>,
    refresh_margin: chrono::Duration,
    locks: DashMap<RefreshKey, Arc<Mutex<()>>>,
}

impl TokenRefreshManager {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        registry: Arc<ProviderRegistry>,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            refresh_margin: chrono::Duration::from_std(refresh_margin)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Return a valid access token, refreshing it first if it expires within
    /// the safety margin.
    ///
    /// A credential with no recorded expiry is returned as stored; a 401 from
    /// the provider is the staleness signal in that case. On refresh failure
    /// the stored credential is left untouched.
    pub async fn get_valid_access_token(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<AccessToken, IntegrationError> {
        let credential = self.load(user_id, provider).await?;
        if !credential.needs_refresh(Utc::now(), self.refresh_margin) {
            return Ok(credential.access_token);
        }

        let key = (user_id, provider);
        let lock = self.locks.entry(key).or_default().clone();

        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user_id, provider).await
        };

        drop(lock);
        // Only the map's own reference left means nobody else is waiting
        self.locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);

        result
    }

    async fn load(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Credential, IntegrationError> {
        self.store
            .load(user_id, provider)
            .await?
            .ok_or(IntegrationError::NotConnected { provider })
    }

    /// Runs with the per-key lock held.
    async fn refresh_locked(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<AccessToken, IntegrationError> {
        // Another flow may have refreshed while this one waited for the lock
        let credential = self.load(user_id, provider).await?;
        let now = Utc::now();
        if !credential.needs_refresh(now, self.refresh_margin) {
            return Ok(credential.access_token);
        }

        let Some(refresh_token) = credential.refresh_token.as_ref() else {
            tracing::info!(
                user_id = %user_id,
                provider = %provider,
                "Credential expiring without a refresh token"
            );
            return Err(IntegrationError::ReauthorizationRequired { provider });
        };

        let adapter = self.registry.get(provider)?;
        let oauth = adapter.oauth().ok_or_else(|| {
            IntegrationError::configuration(format!("{} does not support token refresh", provider))
        })?;

        let grant = oauth.refresh(refresh_token).await.map_err(|err| {
            tracing::warn!(
                user_id = %user_id,
                provider = %provider,
                error = %err,
                "Token refresh failed"
            );
            err
        })?;

        let refreshed = credential.refreshed(grant, now);
        self.store.save(&refreshed).await?;

        tracing::info!(
            user_id = %user_id,
            provider = %provider,
            expires_at = ?refreshed.expires_at,
            "Refreshed provider access token"
        );

        Ok(refreshed.access_token)
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }
}
