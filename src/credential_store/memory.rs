//! In-process credential store, used by tests and local development.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CredentialStore, CredentialStoreError};
use crate::domain::{Credential, ProviderKind};

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<(Uuid, ProviderKind), Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        Ok(self.credentials.read().await.get(&(user_id, provider)).cloned())
    }

    async fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        self.credentials
            .write()
            .await
            .insert((credential.user_id, credential.provider), credential.clone());
        Ok(())
    }

    async fn clear(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<bool, CredentialStoreError> {
        Ok(self
            .credentials
            .write()
            .await
            .remove(&(user_id, provider))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn credential(user_id: Uuid) -> Credential {
        Credential {
            user_id,
            provider: ProviderKind::GoogleCalendar,
            access_token: "access".into(),
            refresh_token: Some("refresh".into()),
            expires_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = MemoryCredentialStore::new();
        let user = Uuid::new_v4();

        assert!(store.load(user, ProviderKind::GoogleCalendar).await.unwrap().is_none());

        let cred = credential(user);
        store.save(&cred).await.unwrap();
        assert_eq!(
            store.load(user, ProviderKind::GoogleCalendar).await.unwrap(),
            Some(cred)
        );

        assert!(store.clear(user, ProviderKind::GoogleCalendar).await.unwrap());
        assert!(!store.clear(user, ProviderKind::GoogleCalendar).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_keys_are_per_provider() {
        let store = MemoryCredentialStore::new();
        let user = Uuid::new_v4();
        store.save(&credential(user)).await.unwrap();

        assert!(store.load(user, ProviderKind::Paypal).await.unwrap().is_none());
        assert!(store.load(Uuid::new_v4(), ProviderKind::GoogleCalendar).await.unwrap().is_none());
    }
}
