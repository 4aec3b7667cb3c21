//! PayPal balance adapter
//!
//! Client-credentials bearer token, then `/v1/reporting/balances`, whose
//! values are major-unit decimal strings.

use async_trait::async_trait;
use serde::Deserialize;

use super::descriptor::{AuthScheme, CredentialSource, CurrencyUnits, ProviderDescriptor};
use super::http::{parse_currency, ProviderHttp, TokenResponse};
use super::{ProviderAdapter, ProviderSession};
use crate::config::{PaypalConfig, ProviderTimeouts};
use crate::domain::{
    BalanceParams, CurrencyCode, IntegrationError, Money, Operation, ProviderKind,
};

pub struct PaypalAdapter {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
    config: PaypalConfig,
    timeouts: ProviderTimeouts,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<CurrencyBalance>,
}

#[derive(Debug, Deserialize)]
struct CurrencyBalance {
    total_balance: PaypalMoney,
    #[serde(default)]
    available_balance: Option<PaypalMoney>,
}

#[derive(Debug, Deserialize)]
struct PaypalMoney {
    currency_code: String,
    value: String,
}

impl PaypalAdapter {
    pub fn new(client: reqwest::Client, config: PaypalConfig, timeouts: ProviderTimeouts) -> Self {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::Paypal,
            display_name: "PayPal",
            base_url: config.base_url.clone(),
            auth_scheme: AuthScheme::Bearer,
            credential_source: CredentialSource::Service,
            units: Some(CurrencyUnits {
                currency: CurrencyCode::USD,
                minor_unit_exponent: 0,
            }),
            operations: &[Operation::QueryBalance],
        };
        let http = ProviderHttp::new(client, ProviderKind::Paypal, CredentialSource::Service);

        Self {
            descriptor,
            http,
            config,
            timeouts,
        }
    }
}

#[async_trait]
impl ProviderAdapter for PaypalAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn authenticate(&self) -> Result<ProviderSession, IntegrationError> {
        let request = self
            .http
            .client()
            .post(self.descriptor.endpoint("v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.expose()))
            .form(&[("grant_type", "client_credentials")]);

        let response: TokenResponse = self.http.send_json(request, self.timeouts.auth).await?;
        Ok(ProviderSession::new(response.into_grant().access_token))
    }

    async fn query_balance(
        &self,
        session: &ProviderSession,
        params: &BalanceParams,
    ) -> Result<Money, IntegrationError> {
        let request = self
            .http
            .client()
            .get(self.descriptor.endpoint("v1/reporting/balances"))
            .bearer_auth(session.access_token.expose());

        let response: BalancesResponse = self.http.send_json(request, self.timeouts.balance).await?;

        let balance = params
            .currency
            .and_then(|wanted| {
                response.balances.iter().find(|b| {
                    b.total_balance
                        .currency_code
                        .eq_ignore_ascii_case(wanted.as_str())
                })
            })
            .or_else(|| response.balances.first())
            .ok_or_else(|| {
                IntegrationError::rejected(ProviderKind::Paypal, None, "no balance data returned")
            })?;

        let reported = balance
            .available_balance
            .as_ref()
            .unwrap_or(&balance.total_balance);
        let currency = parse_currency(ProviderKind::Paypal, &reported.currency_code)?;

        Money::parse_major(&reported.value, currency)
            .map_err(|e| IntegrationError::transient(ProviderKind::Paypal, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use rust_decimal_macros::dec;

    fn adapter(base: &str) -> PaypalAdapter {
        PaypalAdapter::new(
            reqwest::Client::new(),
            PaypalConfig {
                client_id: "paypal-client".to_string(),
                client_secret: "paypal-secret".into(),
                base_url: base.to_string(),
            },
            ProviderTimeouts::default(),
        )
    }

    #[tokio::test]
    async fn test_authenticate_then_balance() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/v1/oauth2/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()))
            .with_status(200)
            .with_body(r#"{"scope":"https://uri.paypal.com/services/reporting","access_token":"A21AA","token_type":"Bearer","expires_in":32400}"#)
            .create_async()
            .await;
        let balances = server
            .mock("GET", "/v1/reporting/balances")
            .match_header("authorization", "Bearer A21AA")
            .with_status(200)
            .with_body(
                r#"{"balances":[{"currency":"USD","primary":true,
                    "total_balance":{"currency_code":"USD","value":"1500.00"},
                    "available_balance":{"currency_code":"USD","value":"1420.75"}}]}"#,
            )
            .create_async()
            .await;

        let adapter = adapter(&server.url());
        let session = adapter.authenticate().await.unwrap();
        let money = adapter
            .query_balance(&session, &BalanceParams::default())
            .await
            .unwrap();

        assert_eq!(money.amount, dec!(1420.75));
        assert_eq!(money.currency, CurrencyCode::USD);
        token.assert_async().await;
        balances.assert_async().await;
    }

    #[tokio::test]
    async fn test_total_balance_when_available_missing() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v1/reporting/balances")
            .with_status(200)
            .with_body(r#"{"balances":[{"total_balance":{"currency_code":"EUR","value":"12.5"}}]}"#)
            .create_async()
            .await;

        let money = adapter(&server.url())
            .query_balance(&ProviderSession::new("t"), &BalanceParams::default())
            .await
            .unwrap();

        assert_eq!(money.amount, dec!(12.5));
        assert_eq!(money.currency.as_str(), "EUR");
    }

    #[tokio::test]
    async fn test_bad_client_credentials() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/v1/oauth2/token")
            .with_status(401)
            .with_body(r#"{"error":"invalid_client","error_description":"Client Authentication failed"}"#)
            .create_async()
            .await;

        let err = adapter(&server.url()).authenticate().await.unwrap_err();
        assert!(matches!(err, IntegrationError::Configuration(_)));
    }
}
