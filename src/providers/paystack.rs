//! Paystack balance adapter (static secret key as bearer, amounts in kobo).

use async_trait::async_trait;
use serde::Deserialize;

use super::descriptor::{AuthScheme, CredentialSource, CurrencyUnits, ProviderDescriptor};
use super::http::{parse_currency, ProviderHttp};
use super::{ProviderAdapter, ProviderSession};
use crate::config::{CardPaymentConfig, ProviderTimeouts};
use crate::domain::{
    BalanceParams, CurrencyCode, IntegrationError, Money, Operation, ProviderKind, SecretString,
};

pub struct PaystackAdapter {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
    api_key: SecretString,
    timeouts: ProviderTimeouts,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<BalanceEntry>,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    balance: i64,
    currency: String,
}

impl PaystackAdapter {
    pub fn new(client: reqwest::Client, config: &CardPaymentConfig, timeouts: ProviderTimeouts) -> Self {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::Paystack,
            display_name: "Paystack",
            base_url: config.base_url.clone(),
            auth_scheme: AuthScheme::Bearer,
            credential_source: CredentialSource::Service,
            units: Some(CurrencyUnits {
                currency: CurrencyCode::NGN,
                minor_unit_exponent: 2,
            }),
            operations: &[Operation::QueryBalance],
        };
        let http = ProviderHttp::new(client, ProviderKind::Paystack, CredentialSource::Service);

        Self {
            descriptor,
            http,
            api_key: config.api_key.clone(),
            timeouts,
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaystackAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    /// The secret key is used directly as the bearer token.
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
            .get(self.descriptor.endpoint("balance"))
            .bearer_auth(session.access_token.expose());

        let response: BalanceResponse = self.http.send_json(request, self.timeouts.balance).await?;

        if !response.status || response.data.is_empty() {
            return Err(IntegrationError::rejected(
                ProviderKind::Paystack,
                None,
                response
                    .message
                    .unwrap_or_else(|| "no balance data returned".to_string()),
            ));
        }

        let entry = params
            .currency
            .and_then(|wanted| {
                response
                    .data
                    .iter()
                    .find(|e| e.currency.eq_ignore_ascii_case(wanted.as_str()))
            })
            .unwrap_or(&response.data[0]);

        let currency = parse_currency(ProviderKind::Paystack, &entry.currency)?;
        let units = self.descriptor.units.map(|u| u.minor_unit_exponent).unwrap_or(2);

        Money::from_minor_units(entry.balance, units, currency)
            .map_err(|e| IntegrationError::transient(ProviderKind::Paystack, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use rust_decimal_macros::dec;

    fn adapter(base: &str) -> PaystackAdapter {
        PaystackAdapter::new(
            reqwest::Client::new(),
            &CardPaymentConfig {
                provider: ProviderKind::Paystack,
                api_key: "sk_test_paystack".into(),
                base_url: base.to_string(),
            },
            ProviderTimeouts::default(),
        )
    }

    #[tokio::test]
    async fn test_balance_kobo_to_naira() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/balance")
            .match_header("authorization", "Bearer sk_test_paystack")
            .with_status(200)
            .with_body(r#"{"status":true,"message":"Balances retrieved","data":[{"currency":"NGN","balance":150000}]}"#)
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let session = adapter.authenticate().await.unwrap();
        let money = adapter
            .query_balance(&session, &BalanceParams::default())
            .await
            .unwrap();

        assert_eq!(money.amount, dec!(1500.00));
        assert_eq!(money.currency, CurrencyCode::NGN);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_balance_prefers_requested_currency() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/balance")
            .with_status(200)
            .with_body(r#"{"status":true,"data":[{"currency":"NGN","balance":100},{"currency":"KES","balance":250050}]}"#)
            .create_async()
            .await;

        let money = adapter(&server.url())
            .query_balance(
                &ProviderSession::new("k"),
                &BalanceParams {
                    currency: Some(CurrencyCode::KES),
                },
            )
            .await
            .unwrap();

        assert_eq!(money.amount, dec!(2500.50));
        assert_eq!(money.currency, CurrencyCode::KES);
    }

    #[tokio::test]
    async fn test_empty_balance_is_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/balance")
            .with_status(200)
            .with_body(r#"{"status":false,"message":"Invalid key","data":[]}"#)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .query_balance(&ProviderSession::new("k"), &BalanceParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::ProviderRejected { .. }));
    }

    #[tokio::test]
    async fn test_bad_key_is_configuration_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/balance")
            .with_status(401)
            .with_body(r#"{"status":false,"message":"Invalid key"}"#)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .query_balance(&ProviderSession::new("k"), &BalanceParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }
}
