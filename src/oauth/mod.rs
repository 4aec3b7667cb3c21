//! OAuth module
//!
//! Per-user provider authorization: connecting, refreshing and disconnecting.

mod connection;
mod refresh;
mod state;

pub use connection::{AuthorizationRequest, ConnectionError, ConnectionService, ConnectionStatus};
pub use refresh::TokenRefreshManager;
pub use state::{OAuthStateError, OAuthStateSigner};
