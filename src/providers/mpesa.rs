//! M-Pesa (Safaricom Daraja) adapter
//!
//! Client-credentials bearer token plus a per-request signed password for
//! STK push (Lipa na M-Pesa Online) payment prompts.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;

use super::descriptor::{AuthScheme, CredentialSource, CurrencyUnits, ProviderDescriptor};
use super::http::{ProviderHttp, TokenResponse};
use super::{ProviderAdapter, ProviderSession};
use crate::config::{MpesaConfig, ProviderTimeouts};
use crate::domain::{
    CurrencyCode, IntegrationError, Operation, ProviderKind, PushPaymentParams, TransactionHandle,
};

/// Daraja limits
const ACCOUNT_REFERENCE_MAX: usize = 12;
const TRANSACTION_DESC_MAX: usize = 13;
const DEFAULT_DESCRIPTION: &str = "Subscription Payment";

/// Daraja timestamps are East Africa Time (UTC+3)
const EAT_OFFSET_HOURS: i64 = 3;

pub struct MpesaAdapter {
    descriptor: ProviderDescriptor,
    http: ProviderHttp,
    config: MpesaConfig,
    timeouts: ProviderTimeouts,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    response_code: String,
    #[serde(default)]
    response_description: Option<String>,
    #[serde(default)]
    customer_message: Option<String>,
}

impl MpesaAdapter {
    pub fn new(client: reqwest::Client, config: MpesaConfig, timeouts: ProviderTimeouts) -> Self {
        let descriptor = ProviderDescriptor {
            kind: ProviderKind::Mpesa,
            display_name: "M-Pesa",
            base_url: config.base_url.clone(),
            auth_scheme: AuthScheme::SignedPassword,
            credential_source: CredentialSource::Service,
            units: Some(CurrencyUnits {
                currency: CurrencyCode::KES,
                minor_unit_exponent: 0,
            }),
            operations: &[Operation::PushPayment],
        };
        let http = ProviderHttp::new(client, ProviderKind::Mpesa, CredentialSource::Service);

        Self {
            descriptor,
            http,
            config,
            timeouts,
        }
    }

    fn rejected(message: impl Into<String>) -> IntegrationError {
        IntegrationError::rejected(ProviderKind::Mpesa, None, message)
    }
}

/// `YYYYMMDDHHmmss` in East Africa Time.
pub fn daraja_timestamp(now: DateTime<Utc>) -> String {
    (now.naive_utc() + Duration::hours(EAT_OFFSET_HOURS))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn stk_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

/// Normalize a Kenyan mobile number to `2547XXXXXXXX` / `2541XXXXXXXX`.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let national = if let Some(rest) = digits.strip_prefix("254") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits.as_str()
    };

    if national.len() == 9 && (national.starts_with('7') || national.starts_with('1')) {
        Some(format!("254{}", national))
    } else {
        None
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[async_trait]
impl ProviderAdapter for MpesaAdapter {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn authenticate(&self) -> Result<ProviderSession, IntegrationError> {
        let request = self
            .http
            .client()
            .get(self.descriptor.endpoint("oauth/v1/generate"))
            .query(&[("grant_type", "client_credentials")])
            .basic_auth(
                self.config.consumer_key.expose(),
                Some(self.config.consumer_secret.expose()),
            );

        let response: TokenResponse = self.http.send_json(request, self.timeouts.auth).await?;
        Ok(ProviderSession::new(response.into_grant().access_token))
    }

    async fn push_payment(
        &self,
        session: &ProviderSession,
        params: &PushPaymentParams,
    ) -> Result<TransactionHandle, IntegrationError> {
        let amount = params
            .amount
            .whole_units()
            .ok_or_else(|| Self::rejected("M-Pesa accepts whole shilling amounts only"))?;

        let phone = normalize_phone_number(&params.phone_number)
            .ok_or_else(|| Self::rejected("invalid Safaricom phone number"))?;

        let account_reference = truncate_chars(params.account_reference.trim(), ACCOUNT_REFERENCE_MAX);
        if account_reference.is_empty() {
            return Err(Self::rejected("account reference is required"));
        }

        let description = params
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        // Recomputed per call; the password is only valid around its timestamp
        let timestamp = daraja_timestamp(Utc::now());
        let password = stk_password(
            &self.config.shortcode,
            self.config.passkey.expose(),
            &timestamp,
        );

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": password,
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": amount,
            "PartyA": phone,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone,
            "CallBackURL": self.config.callback_url,
            "AccountReference": account_reference,
            "TransactionDesc": truncate_chars(description, TRANSACTION_DESC_MAX).trim_end(),
        });

        let request = self
            .http
            .client()
            .post(self.descriptor.endpoint("mpesa/stkpush/v1/processrequest"))
            .bearer_auth(session.access_token.expose())
            .json(&payload);

        let response: StkPushResponse = self.http.send_json(request, self.timeouts.payment).await?;

        if response.response_code != "0" {
            let message = response
                .response_description
                .or(response.customer_message)
                .unwrap_or_else(|| format!("ResponseCode {}", response.response_code));
            return Err(Self::rejected(message));
        }

        let correlation_id = response.checkout_request_id.ok_or_else(|| {
            IntegrationError::transient(ProviderKind::Mpesa, "response missing CheckoutRequestID")
        })?;

        tracing::info!(
            checkout_request_id = %correlation_id,
            amount = amount,
            "STK push accepted"
        );

        Ok(TransactionHandle {
            provider: ProviderKind::Mpesa,
            correlation_id,
            merchant_request_id: response.merchant_request_id,
            customer_message: response.customer_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, BalanceParams};
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use rust_decimal_macros::dec;

    fn adapter(base: &str) -> MpesaAdapter {
        MpesaAdapter::new(
            reqwest::Client::new(),
            MpesaConfig {
                consumer_key: "key".into(),
                consumer_secret: "secret".into(),
                shortcode: "174379".to_string(),
                passkey: "passkey".into(),
                callback_url: "https://example.com/api/payments/mpesa/callback".to_string(),
                base_url: base.to_string(),
            },
            ProviderTimeouts::default(),
        )
    }

    fn params(amount: rust_decimal::Decimal) -> PushPaymentParams {
        PushPaymentParams {
            phone_number: "0712 345 678".to_string(),
            amount: Amount::new(amount).unwrap(),
            account_reference: "Netflix Premium Plan".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_daraja_timestamp_is_eat() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 22, 15, 9).unwrap();
        assert_eq!(daraja_timestamp(now), "20260201011509");
    }

    #[test]
    fn test_stk_password() {
        assert_eq!(
            stk_password("174379", "passkey", "20260201011509"),
            STANDARD.encode("174379passkey20260201011509")
        );
    }

    #[test]
    fn test_normalize_phone_number() {
        assert_eq!(normalize_phone_number("0712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_phone_number("+254 712 345 678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_phone_number("712345678").as_deref(), Some("254712345678"));
        assert_eq!(normalize_phone_number("0110345678").as_deref(), Some("254110345678"));
        assert_eq!(normalize_phone_number("0812345678"), None);
        assert_eq!(normalize_phone_number("07123"), None);
        assert_eq!(normalize_phone_number("07abc45678"), None);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/oauth/v1/generate")
            .match_query(Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()))
            .match_header("authorization", Matcher::Regex("^Basic ".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"daraja-token","expires_in":"3599"}"#)
            .create_async()
            .await;

        let session = adapter(&server.url()).authenticate().await.unwrap();
        assert_eq!(session.access_token.expose(), "daraja-token");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_payment_accepted() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .match_header("authorization", "Bearer daraja-token")
            .match_body(Matcher::PartialJson(json!({
                "BusinessShortCode": "174379",
                "TransactionType": "CustomerPayBillOnline",
                "Amount": 500,
                "PhoneNumber": "254712345678",
                "AccountReference": "Netflix Prem",
                "TransactionDesc": "Subscription",
            })))
            .with_status(200)
            .with_body(
                r#"{"MerchantRequestID":"29115-34620561-1","CheckoutRequestID":"ws_CO_191220191020363925","ResponseCode":"0","ResponseDescription":"Success. Request accepted for processing","CustomerMessage":"Success. Request accepted for processing"}"#,
            )
            .create_async()
            .await;

        let handle = adapter(&server.url())
            .push_payment(&ProviderSession::new("daraja-token"), &params(dec!(500)))
            .await
            .unwrap();

        assert_eq!(handle.correlation_id, "ws_CO_191220191020363925");
        assert_eq!(handle.merchant_request_id.as_deref(), Some("29115-34620561-1"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_push_payment_nonzero_response_code() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .with_status(200)
            .with_body(r#"{"ResponseCode":"1","ResponseDescription":"Insufficient float"}"#)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .push_payment(&ProviderSession::new("t"), &params(dec!(10)))
            .await
            .unwrap_err();

        match err {
            IntegrationError::ProviderRejected { message, .. } => {
                assert_eq!(message, "Insufficient float")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fractional_amount_rejected_without_network() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/mpesa/stkpush/v1/processrequest")
            .expect(0)
            .create_async()
            .await;

        let err = adapter(&server.url())
            .push_payment(&ProviderSession::new("t"), &params(dec!(10.50)))
            .await
            .unwrap_err();

        assert!(matches!(err, IntegrationError::ProviderRejected { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_balance_not_supported() {
        let err = adapter("http://127.0.0.1:9")
            .query_balance(&ProviderSession::new("t"), &BalanceParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::UnsupportedOperation { .. }));
    }
}
