//! Outbound client for the external payment gateway.
//!
//! The core never handles card data; it only creates payment intents and
//! consumes status callbacks. The trait seam exists so checkout can be
//! exercised against a stub gateway in tests.

use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Gateway reference plus the redirect handle the storefront sends the
/// customer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub external_reference: String,
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates (or re-requests) a payment intent. `order_id` doubles as the
    /// idempotency key, so retrying for the same order never double-charges.
    async fn create_intent(
        &self,
        order_id: Uuid,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError>;
}

/// HTTP gateway client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Serialize)]
struct CreateIntentRequest<'a> {
    external_reference: String,
    amount_minor: i64,
    currency: &'a str,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct CreateIntentResponse {
    id: String,
    redirect_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: String, token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url,
            token,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        order_id: Uuid,
        amount_minor: i64,
        currency: &str,
    ) -> Result<PaymentIntent, ServiceError> {
        let body = CreateIntentRequest {
            external_reference: order_id.to_string(),
            amount_minor,
            currency,
            idempotency_key: order_id.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/v1/intents", self.base_url))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("intent request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway returned {}: {}",
                status, detail
            )));
        }

        let parsed: CreateIntentResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("intent response: {}", e)))?;

        info!(order_id = %order_id, reference = %parsed.id, "payment intent created");
        Ok(PaymentIntent {
            external_reference: parsed.id,
            redirect_url: parsed.redirect_url,
        })
    }
}
