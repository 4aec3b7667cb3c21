//! Signed OAuth `state`
//!
//! `state` round-trips through the provider's consent screen, so a bare user
//! id would let anyone attach their tokens to another user. The value is
//! `<user_id>.<nonce>.<signature>` where the signature is the hex
//! HMAC-SHA256 of `user_id:provider:nonce` keyed by the state secret.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::{ProviderKind, SecretString};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OAuthStateError {
    #[error("Malformed state parameter")]
    Malformed,

    #[error("Invalid user in state parameter")]
    InvalidUser,

    #[error("State signature mismatch")]
    SignatureMismatch,

    #[error("Unusable state signing key")]
    InvalidKey,
}

#[derive(Clone)]
pub struct OAuthStateSigner {
    /// Keyed with the state secret; cloned per signature
    key: Hmac<Sha256>,
}

impl OAuthStateSigner {
    pub fn new(secret: &SecretString) -> Result<Self, OAuthStateError> {
        let key = <Hmac<Sha256> as Mac>::new_from_slice(secret.expose().as_bytes())
            .map_err(|_| OAuthStateError::InvalidKey)?;
        Ok(Self { key })
    }

    pub fn sign(&self, user_id: Uuid, provider: ProviderKind) -> String {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let nonce = hex::encode(nonce);

        let signature = hex::encode(self.mac(user_id, provider, &nonce).finalize().into_bytes());
        format!("{}.{}.{}", user_id, nonce, signature)
    }

    /// Verify a state value and return the user it was issued for.
    pub fn verify(&self, state: &str, provider: ProviderKind) -> Result<Uuid, OAuthStateError> {
        let mut parts = state.split('.');
        let (Some(user), Some(nonce), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(OAuthStateError::Malformed);
        };

        if nonce.len() != 32 || signature.len() != 64 {
            return Err(OAuthStateError::Malformed);
        }

        let user_id = Uuid::parse_str(user).map_err(|_| OAuthStateError::InvalidUser)?;

        let signature = hex::decode(signature).map_err(|_| OAuthStateError::Malformed)?;
        self.mac(user_id, provider, nonce)
            .verify_slice(&signature)
            .map_err(|_| OAuthStateError::SignatureMismatch)?;

        Ok(user_id)
    }

    fn mac(&self, user_id: Uuid, provider: ProviderKind, nonce: &str) -> Hmac<Sha256> {
        let mut mac = self.key.clone();
        mac.update(user_id.to_string().as_bytes());
        mac.update(b":");
        mac.update(provider.as_str().as_bytes());
        mac.update(b":");
        mac.update(nonce.as_bytes());
        mac
    }
}
