//! Postgres credential store
//!
//! Rows live in `provider_credentials`, keyed by (user_id, provider). A
//! disconnect nulls the token columns rather than deleting the row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{CredentialStore, CredentialStoreError};
use crate::domain::{Credential, ProviderKind, SecretString};

/// Repository for provider credentials
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    /// Create a new PgCredentialStore
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn load(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<Option<Credential>, CredentialStoreError> {
        let row: Option<(Option<String>, Option<String>, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT access_token, refresh_token, expires_at
            FROM provider_credentials
            WHERE user_id = $1 AND provider = $2
            "#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .fetch_optional(&self.pool)
        .await?;

        // A cleared row has a NULL access token
        let Some((Some(access_token), refresh_token, expires_at)) = row else {
            return Ok(None);
        };

        if access_token.is_empty() {
            return Err(CredentialStoreError::Corrupt {
                user_id,
                provider,
                reason: "empty access token".to_string(),
            });
        }

        Ok(Some(Credential {
            user_id,
            provider,
            access_token: SecretString::from(access_token),
            refresh_token: refresh_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
            expires_at,
        }))
    }

    async fn save(&self, credential: &Credential) -> Result<(), CredentialStoreError> {
        sqlx::query(
            r#"
            INSERT INTO provider_credentials
                (user_id, provider, access_token, refresh_token, expires_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (user_id, provider) DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(credential.user_id)
        .bind(credential.provider.as_str())
        .bind(credential.access_token.expose())
        .bind(credential.refresh_token.as_ref().map(|t| t.expose()))
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            user_id = %credential.user_id,
            provider = %credential.provider,
            expires_at = ?credential.expires_at,
            "Saved provider credential"
        );

        Ok(())
    }

    async fn clear(
        &self,
        user_id: Uuid,
        provider: ProviderKind,
    ) -> Result<bool, CredentialStoreError> {
        let rows = sqlx::query(
            r#"
            UPDATE provider_credentials
            SET access_token = NULL,
                refresh_token = NULL,
                expires_at = NULL,
                updated_at = NOW()
            WHERE user_id = $1 AND provider = $2 AND access_token IS NOT NULL
            "#,
        )
        .bind(user_id)
        .bind(provider.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }
}
