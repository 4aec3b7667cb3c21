//! Flutterwave balance adapter
//!
//! Static secret key as bearer. Balances are already in major units.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::descriptor::{AuthScheme, CredentialSource, CurrencyUnits, ProviderDescriptor};
use super::http::{parse_currency, ProviderHttp};
use super::{ProviderAdapter, ProviderSession};
use crate::config::{CardPaymentConfig, ProviderTimeouts};
use crate::domain::{
    BalanceParams, CurrencyCode, IntegrationError, Money, Operation, ProviderKind, SecretString,
};

pub struct FlutterwaveAdapter {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
    api_key: SecretString,
    timeouts: ProviderTimeouts,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<WalletBalance>,
}

#[derive(Debug, Deserialize)]
struct WalletBalance {
    currency: String,
    available_balance: Decimal,
}

impl FlutterwaveAdapter {
    pub fn new(client: reqwest::Client, config: &CardPaymentConfig, timeouts: ProviderTimeouts) -> Self {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::Flutterwave,
            display_name: "Flutterwave",
            base_url: config.base_url.clone(),
            auth_scheme: AuthScheme::Bearer,
            credential_source: CredentialSource::Service,
            units: Some(CurrencyUnits {
                currency: CurrencyCode::KES,
                minor_unit_exponent: 0,
            }),
            operations: &[Operation::QueryBalance],
        };
        let http = ProviderHttp::new(client, ProviderKind::Flutterwave, CredentialSource::Service);

        Self {
            descriptor,
            http,
            api_key: config.api_key.clone(),
            timeouts,
        }
    }
}

#[async_trait]
impl ProviderAdapter for FlutterwaveAdapter {
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
            .get(self.descriptor.endpoint("v3/balances"))
            .bearer_auth(session.access_token.expose());

        let response: BalancesResponse = self.http.send_json(request, self.timeouts.balance).await?;

        if response.status != "success" || response.data.is_empty() {
            return Err(IntegrationError::rejected(
                ProviderKind::Flutterwave,
                None,
                response
                    .message
                    .unwrap_or_else(|| "no balance data returned".to_string()),
            ));
        }

        // Requested currency, then the default wallet, then whatever comes first
        let wanted = params.currency.unwrap_or(self.descriptor.default_currency());
        let wallet = response
            .data
            .iter()
            .find(|w| w.currency.eq_ignore_ascii_case(wanted.as_str()))
            .unwrap_or(&response.data[0]);

        let currency = parse_currency(ProviderKind::Flutterwave, &wallet.currency)?;
        Ok(Money::new(wallet.available_balance, currency))
    }
}
