//! Stripe balance adapter
//!
//! Secret key as the basic-auth user. Amounts are in the currency's smallest
//! unit, which is the whole unit for zero-decimal currencies.

use async_trait::async_trait;
use serde::Deserialize;

use super::descriptor::{AuthScheme, CredentialSource, CurrencyUnits, ProviderDescriptor};
use super::http::{parse_currency, ProviderHttp};
use super::{ProviderAdapter, ProviderSession};
use crate::config::{CardPaymentConfig, ProviderTimeouts};
use crate::domain::{
    BalanceParams, CurrencyCode, IntegrationError, Money, Operation, ProviderKind, SecretString,
};

/// Currencies Stripe reports without minor units
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

pub struct StripeAdapter {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
    api_key: SecretString,
    timeouts: ProviderTimeouts,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(default)]
    available: Vec<BalanceAmount>,
}

#[derive(Debug, Deserialize)]
struct BalanceAmount {
    amount: i64,
    currency: String,
}

pub fn minor_unit_exponent(currency: CurrencyCode) -> u32 {
    if ZERO_DECIMAL_CURRENCIES.contains(&currency.as_str()) {
        0
    } else {
        2
    }
}

impl StripeAdapter {
    pub fn new(client: reqwest::Client, config: &CardPaymentConfig, timeouts: ProviderTimeouts) -> Self {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::Stripe,
            display_name: "Stripe",
            base_url: config.base_url.clone(),
            auth_scheme: AuthScheme::Basic,
            credential_source: CredentialSource::Service,
            units: Some(CurrencyUnits {
                currency: CurrencyCode::USD,
                minor_unit_exponent: 2,
            }),
            operations: &[Operation::QueryBalance],
        };
        let http = ProviderHttp::new(client, ProviderKind::Stripe, CredentialSource::Service);

        Self {
            descriptor,
            http,
            api_key: config.api_key.clone(),
            timeouts,
        }
    }
}

#[async_trait]
impl ProviderAdapter for StripeAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn authenticate(&self) -> Result<ProviderSession, IntegrationError> {
        Ok(ProviderSession::new(self.api_key.clone()))
    }

    async fn query_balance(
        &self,
        session: &ProviderSession,
        params: &BalanceParams,
    ) -> Result<Money, IntegrationError> {
        let request = self
            .http
            .client()
            .get(self.descriptor.endpoint("v1/balance"))
            .basic_auth(session.access_token.expose(), None::<&str>);

        let response: BalanceResponse = self.http.send_json(request, self.timeouts.balance).await?;

        let entry = params
            .currency
            .and_then(|wanted| {
                response
                    .available
                    .iter()
                    .find(|a| a.currency.eq_ignore_ascii_case(wanted.as_str()))
            })
            .or_else(|| response.available.first())
            .ok_or_else(|| {
                IntegrationError::rejected(ProviderKind::Stripe, None, "no balance data returned")
            })?;

        // Stripe reports lowercase codes
        let currency = parse_currency(ProviderKind::Stripe, &entry.currency)?;

        Money::from_minor_units(entry.amount, minor_unit_exponent(currency), currency)
            .map_err(|e| IntegrationError::transient(ProviderKind::Stripe, e.to_string()))
    }
}
