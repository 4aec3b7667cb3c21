//! Configuration module
//!
//! Loads configuration from environment variables once at start-up. Provider
//! secrets are handed to adapters through their constructors; nothing below
//! this module reads the process environment.

use std::env;
use std::time::Duration;

use url::Url;

use crate::domain::{Operation, ProviderKind, SecretString};

const DEV_STATE_SECRET: &str = "dev-only-oauth-state-secret";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Key for signing the OAuth `state` parameter
    pub oauth_state_secret: SecretString,

    pub google: Option<GoogleConfig>,
    pub mpesa: Option<MpesaConfig>,
    pub card_payment: Option<CardPaymentConfig>,
    pub paypal: Option<PaypalConfig>,

    pub timeouts: ProviderTimeouts,

    /// Refresh tokens this long before they expire
    pub token_refresh_margin: Duration,

    /// Pending payments without a callback expire after this long
    pub pending_payment_ttl: Duration,
}

/// Google OAuth client and Calendar API settings
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub auth_url: String,
    pub token_url: String,
    pub calendar_api_url: String,
    pub time_zone: String,
}

/// M-Pesa Daraja API credentials
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: SecretString,
    pub consumer_secret: SecretString,
    pub shortcode: String,
    pub passkey: SecretString,
    pub callback_url: String,
    pub base_url: String,
}

/// The single card processor used for card-balance checks
#[derive(Debug, Clone)]
pub struct CardPaymentConfig {
    pub provider: ProviderKind,
    pub api_key: SecretString,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub base_url: String,
}

/// Outbound call bounds per operation class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTimeouts {
    pub auth: Duration,
    pub balance: Duration,
    pub payment: Duration,
    pub calendar: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            auth: Duration::from_secs(10),
            balance: Duration::from_secs(10),
            payment: Duration::from_secs(30),
            calendar: Duration::from_secs(30),
        }
    }
}

impl ProviderTimeouts {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::QueryBalance => self.balance,
            Operation::PushPayment => self.payment,
            Operation::WriteCalendarEvent => self.calendar,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| is_set(v));

        let database_url = get("DATABASE_URL").ok_or(ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10)?;

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let port = parse_or(&get, "PORT", 8080)?;

        let environment = get("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let oauth_state_secret = match get("OAUTH_STATE_SECRET").or_else(|| get("JWT_SECRET")) {
            Some(secret) => SecretString::from(secret),
            None if environment == "production" => {
                return Err(ConfigError::MissingEnv("OAUTH_STATE_SECRET"));
            }
            None => {
                tracing::warn!("OAUTH_STATE_SECRET not set, using development default");
                SecretString::from(DEV_STATE_SECRET)
            }
        };

        let timeouts = ProviderTimeouts {
            auth: Duration::from_secs(parse_or(&get, "PROVIDER_AUTH_TIMEOUT_SECS", 10)?),
            balance: Duration::from_secs(parse_or(&get, "PROVIDER_BALANCE_TIMEOUT_SECS", 10)?),
            payment: Duration::from_secs(parse_or(&get, "PROVIDER_PAYMENT_TIMEOUT_SECS", 30)?),
            calendar: Duration::from_secs(parse_or(&get, "PROVIDER_CALENDAR_TIMEOUT_SECS", 30)?),
        };

        let token_refresh_margin =
            Duration::from_secs(parse_or(&get, "TOKEN_REFRESH_MARGIN_SECS", 300)?);

        let pending_payment_ttl =
            Duration::from_secs(parse_or::<u64, _>(&get, "PENDING_PAYMENT_TTL_MINUTES", 30)? * 60);

        Ok(Self {
            database_url,
            database_max_connections,
            host,
            port,
            environment,
            oauth_state_secret,
            google: google_config(&get)?,
            mpesa: mpesa_config(&get)?,
            card_payment: card_payment_config(&get)?,
            paypal: paypal_config(&get)?,
            timeouts,
            token_refresh_margin,
            pending_payment_ttl,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Empty values and `your-...` placeholders from sample env files count as unset.
fn is_set(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with("your-")
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

fn url_or<G>(get: &G, key: &'static str, default: &str) -> Result<String, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = get(key).unwrap_or_else(|| default.to_string());
    Url::parse(&value).map_err(|_| ConfigError::InvalidValue(key))?;
    Ok(value)
}

/// Returns the values when every key is set, `None` when none is, and an
/// error naming the first missing key otherwise.
fn all_or_none<G, const N: usize>(
    get: &G,
    keys: [&'static str; N],
) -> Result<Option<[String; N]>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let values = keys.map(|key| get(key));
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    if let Some(idx) = values.iter().position(Option::is_none) {
        return Err(ConfigError::PartialProvider(keys[idx]));
    }
    Ok(Some(values.map(Option::unwrap_or_default)))
}

fn google_config<G>(get: &G) -> Result<Option<GoogleConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some([client_id, client_secret]) =
        all_or_none(get, ["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"])?
    else {
        return Ok(None);
    };

    Ok(Some(GoogleConfig {
        client_id,
        client_secret: client_secret.into(),
        redirect_uri: url_or(
            get,
            "GOOGLE_REDIRECT_URI",
            "http://localhost:3000/api/auth/google/callback",
        )?,
        auth_url: url_or(get, "GOOGLE_AUTH_URL", "https://accounts.google.com/o/oauth2/v2/auth")?,
        token_url: url_or(get, "GOOGLE_TOKEN_URL", "https://oauth2.googleapis.com/token")?,
        calendar_api_url: url_or(
            get,
            "GOOGLE_CALENDAR_API_URL",
            "https://www.googleapis.com/calendar/v3",
        )?,
        time_zone: get("GOOGLE_CALENDAR_TIME_ZONE").unwrap_or_else(|| "Africa/Nairobi".to_string()),
    }))
}

fn mpesa_config<G>(get: &G) -> Result<Option<MpesaConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some([consumer_key, consumer_secret, shortcode, passkey, callback_url]) = all_or_none(
        get,
        [
            "MPESA_CONSUMER_KEY",
            "MPESA_CONSUMER_SECRET",
            "MPESA_SHORTCODE",
            "MPESA_PASSKEY",
            "MPESA_CALLBACK_URL",
        ],
    )?
    else {
        return Ok(None);
    };

    Url::parse(&callback_url).map_err(|_| ConfigError::InvalidValue("MPESA_CALLBACK_URL"))?;

    Ok(Some(MpesaConfig {
        consumer_key: consumer_key.into(),
        consumer_secret: consumer_secret.into(),
        shortcode,
        passkey: passkey.into(),
        callback_url,
        base_url: url_or(get, "MPESA_BASE_URL", "https://sandbox.safaricom.co.ke")?,
    }))
}

fn card_payment_config<G>(get: &G) -> Result<Option<CardPaymentConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some([provider, api_key]) =
        all_or_none(get, ["CARD_PAYMENT_PROVIDER", "CARD_PAYMENT_API_KEY"])?
    else {
        return Ok(None);
    };

    let provider: ProviderKind = provider
        .parse()
        .map_err(|_| ConfigError::InvalidValue("CARD_PAYMENT_PROVIDER"))?;

    let default_base = match provider {
        ProviderKind::Paystack => "https://api.paystack.co",
        ProviderKind::Flutterwave => "https://api.flutterwave.com",
        ProviderKind::Stripe => "https://api.stripe.com",
        _ => return Err(ConfigError::InvalidValue("CARD_PAYMENT_PROVIDER")),
    };

    Ok(Some(CardPaymentConfig {
        provider,
        api_key: api_key.into(),
        base_url: url_or(get, "CARD_PAYMENT_BASE_URL", default_base)?,
    }))
}

fn paypal_config<G>(get: &G) -> Result<Option<PaypalConfig>, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some([client_id, client_secret]) =
        all_or_none(get, ["PAYPAL_CLIENT_ID", "PAYPAL_CLIENT_SECRET"])?
    else {
        return Ok(None);
    };

    Ok(Some(PaypalConfig {
        client_id,
        client_secret: client_secret.into(),
        base_url: url_or(get, "PAYPAL_BASE_URL", "https://api-m.sandbox.paypal.com")?,
    }))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("Provider partially configured, missing: {0}")]
    PartialProvider(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_minimal_config() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/subs")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.timeouts, ProviderTimeouts::default());
        assert_eq!(config.token_refresh_margin, Duration::from_secs(300));
        assert_eq!(config.pending_payment_ttl, Duration::from_secs(30 * 60));
        assert!(config.google.is_none());
        assert!(config.mpesa.is_none());
        assert!(config.card_payment.is_none());
    }

    #[test]
    fn test_missing_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingEnv("DATABASE_URL"))));
    }

    #[test]
    fn test_placeholder_counts_as_unset() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("GOOGLE_CLIENT_ID", "your-google-client-id"),
            ("GOOGLE_CLIENT_SECRET", ""),
        ])
        .unwrap();
        assert!(config.google.is_none());
    }

    #[test]
    fn test_partial_provider_is_error() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("MPESA_CONSUMER_KEY", "key"),
        ]);
        assert!(matches!(
            result,
            Err(ConfigError::PartialProvider("MPESA_CONSUMER_SECRET"))
        ));
    }

    #[test]
    fn test_card_provider_selection() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("CARD_PAYMENT_PROVIDER", "stripe"),
            ("CARD_PAYMENT_API_KEY", "sk_test_123"),
        ])
        .unwrap();
        let card = config.card_payment.unwrap();
        assert_eq!(card.provider, ProviderKind::Stripe);
        assert_eq!(card.base_url, "https://api.stripe.com");

        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("CARD_PAYMENT_PROVIDER", "mpesa"),
            ("CARD_PAYMENT_API_KEY", "key"),
        ]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("CARD_PAYMENT_PROVIDER"))
        ));
    }

    #[test]
    fn test_state_secret_required_in_production() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("ENVIRONMENT", "production"),
        ]);
        assert!(matches!(result, Err(ConfigError::MissingEnv("OAUTH_STATE_SECRET"))));

        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("ENVIRONMENT", "production"),
            ("JWT_SECRET", "jwt-secret"),
        ])
        .unwrap();
        assert_eq!(config.oauth_state_secret.expose(), "jwt-secret");
    }

    #[test]
    fn test_timeouts_for_operation() {
        let timeouts = ProviderTimeouts::default();
        assert_eq!(timeouts.for_operation(Operation::QueryBalance), Duration::from_secs(10));
        assert_eq!(timeouts.for_operation(Operation::PushPayment), Duration::from_secs(30));
        assert_eq!(
            timeouts.for_operation(Operation::WriteCalendarEvent),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_invalid_timeout() {
        let result = load(&[
            ("DATABASE_URL", "postgres://localhost/subs"),
            ("PROVIDER_PAYMENT_TIMEOUT_SECS", "soon"),
        ]);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue("PROVIDER_PAYMENT_TIMEOUT_SECS"))
        ));
    }
}
