//! M-Pesa STK push callback envelope
//!
//! Daraja posts `{"Body":{"stkCallback":{...}}}` to the callback URL once
//! the customer accepts, cancels or ignores the prompt. `CallbackMetadata`
//! is only present on success.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{PaymentConfirmation, PaymentStatus};
use crate::domain::{CurrencyCode, ProviderKind};

#[derive(Debug, Clone, Deserialize)]
pub struct MpesaCallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    pub result_code: i32,
    #[serde(default)]
    pub result_desc: String,
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: Option<Value>,
}

impl CallbackMetadata {
    fn get(&self, name: &str) -> Option<&Value> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }

    fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn decimal(&self, name: &str) -> Option<Decimal> {
        self.text(name)?.parse().ok()
    }
}

impl MpesaCallbackEnvelope {
    pub fn checkout_request_id(&self) -> &str {
        &self.body.stk_callback.checkout_request_id
    }

    pub fn into_confirmation(self, received_at: DateTime<Utc>) -> PaymentConfirmation {
        let callback = self.body.stk_callback;
        let metadata = callback.callback_metadata.as_ref();

        PaymentConfirmation {
            provider: ProviderKind::Mpesa,
            correlation_id: callback.checkout_request_id,
            merchant_request_id: callback.merchant_request_id,
            status: PaymentStatus::from_mpesa_result(callback.result_code),
            result_code: callback.result_code,
            result_desc: callback.result_desc,
            receipt_number: metadata.and_then(|m| m.text("MpesaReceiptNumber")),
            amount: metadata.and_then(|m| m.decimal("Amount")),
            currency: CurrencyCode::KES,
            phone_number: metadata.and_then(|m| m.text("PhoneNumber")),
            received_at,
        }
    }
}
