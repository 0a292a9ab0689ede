//! Inbound payment gateway webhook.
//!
//! The body is taken raw because the HMAC is computed over the exact bytes
//! the gateway signed; parsing happens only after verification. The gateway
//! retries anything that is not a 2xx, so permanent rejections (bad
//! signature, unknown order) answer 401/404 while storage failures answer
//! 503 to invite redelivery.

use crate::{
    errors::ServiceError,
    services::payment_webhook::{Ack, WebhookNotification},
    AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn webhook_routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(payment_webhook))
}

#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    responses(
        (status = 200, description = "Notification ingested (or replay acknowledged)"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown order reference", body = crate::errors::ErrorResponse),
        (status = 503, description = "Transient failure, redeliver", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    if !verify_signature(
        &headers,
        &body,
        &state.config.payment_webhook_secret,
        state.config.payment_webhook_tolerance_secs,
    ) {
        warn!("webhook signature verification failed");
        return Err(ServiceError::InvalidSignature);
    }

    let notification: WebhookNotification = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))?;

    let ack = state.services.webhooks.process(notification).await?;

    let status = match ack {
        Ack::Processed => "processed",
        Ack::Duplicate => "duplicate",
        Ack::Recorded => "recorded",
    };
    info!(status, "webhook acknowledged");
    Ok(Json(json!({ "status": status })))
}

/// HMAC-SHA256 over `"{timestamp}.{body}"` with a freshness window on the
/// timestamp. Comparison is constant-time.
fn verify_signature(
    headers: &HeaderMap,
    payload: &Bytes,
    secret: &str,
    tolerance_secs: u64,
) -> bool {
    let (Some(ts), Some(sig)) = (headers.get(TIMESTAMP_HEADER), headers.get(SIGNATURE_HEADER))
    else {
        return false;
    };
    let (Ok(ts), Ok(sig)) = (ts.to_str(), sig.to_str()) else {
        return false;
    };

    let Ok(ts_i) = ts.parse::<i64>() else {
        return false;
    };
    let now = chrono::Utc::now().timestamp();
    if (now - ts_i).unsigned_abs() > tolerance_secs {
        return false;
    }

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(ts.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, sig)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}
