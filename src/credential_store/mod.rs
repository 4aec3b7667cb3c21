//! Provider Credential Store
//!
//! Single source of truth for per-user provider tokens. Callers re-read
//! through the store on every flow; nothing above it caches a credential.

mod memory;
mod repository;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Credential, IntegrationError, ProviderKind};

pub use memory::MemoryCredentialStore;
pub use repository::PgCredentialStore;

/// Credential store errors
#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt credential row for {user_id}/{provider}: {reason}")]
    Corrupt {
        user_id: Uuid,
        provider: ProviderKind,
        reason: String,
    },
}

impl From<CredentialStoreError> for IntegrationError {
    fn from(err: CredentialStoreError) -> Self {
        IntegrationError::CredentialStore(err.to_string())
    }
}

/// Persistence contract for provider credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential for (user, provider). `None` when never connected
    /// or after a disconnect.
    async fn load(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<Credential>, CredentialStoreError>;

    /// Insert or overwrite the credential for its (user, provider) key.
    async fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError>;

    /// Null out every token field. Returns whether a credential was present.
    async fn clear(&self, user_id: Uuid, provider: ProviderKind)
        -> Result<bool, CredentialStoreError>;
}
