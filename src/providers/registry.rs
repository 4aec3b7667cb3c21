//! Provider registry: the mapping from provider kind to adapter instance.

use std::collections::HashMap;
use std::sync::Arc;

use super::{
    FlutterwaveAdapter, GoogleCalendarAdapter, MpesaAdapter, PaypalAdapter, PaystackAdapter,
    ProviderAdapter, StripeAdapter,
};
use crate::config::Config;
use crate::domain::{IntegrationError, ProviderKind};

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
    card_provider: Option<ProviderKind>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter for every provider with complete configuration.
    pub fn from_config(config: &Config) -> Result<Self, IntegrationError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("subscription-tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                IntegrationError::configuration(format!("failed to build HTTP client: {}", e))
            })?;
        let timeouts = config.timeouts;
        let mut registry = Self::new();

        if let Some(google) = &config.google {
            registry.register(Arc::new(GoogleCalendarAdapter::new(
                client.clone(),
                google.clone(),
                timeouts,
            )));
        }

        if let Some(mpesa) = &config.mpesa {
            registry.register(Arc::new(MpesaAdapter::new(client.clone(), mpesa.clone(), timeouts)));
        }

        if let Some(card) = &config.card_payment {
            let adapter: Arc<dyn ProviderAdapter> = match card.provider {
                ProviderKind::Paystack => {
                    Arc::new(PaystackAdapter::new(client.clone(), card, timeouts))
                }
                ProviderKind::Flutterwave => {
                    Arc::new(FlutterwaveAdapter::new(client.clone(), card, timeouts))
                }
                ProviderKind::Stripe => Arc::new(StripeAdapter::new(client.clone(), card, timeouts)),
                other => {
                    return Err(IntegrationError::configuration(format!(
                        "{} is not a card payment provider",
                        other
                    )))
                }
            };
            registry.register(adapter);
            registry.card_provider = Some(card.provider);
        }

        if let Some(paypal) = &config.paypal {
            registry.register(Arc::new(PaypalAdapter::new(client, paypal.clone(), timeouts)));
        }

        tracing::info!(providers = ?registry.configured(), "Provider adapters registered");
        Ok(registry)
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn with_card_provider(mut self, kind: ProviderKind) -> Self {
        self.card_provider = Some(kind);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>, IntegrationError> {
        self.adapters.get(&kind).cloned().ok_or_else(|| {
            IntegrationError::configuration(format!("{} is not configured", kind))
        })
    }

    /// Provider selected by `CARD_PAYMENT_PROVIDER`.
    pub fn card_provider(&self) -> Result<ProviderKind, IntegrationError> {
        self.card_provider.ok_or_else(|| {
            IntegrationError::configuration(
                "card payment provider not configured; set CARD_PAYMENT_PROVIDER and CARD_PAYMENT_API_KEY",
            )
        })
    }

    pub fn configured(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
