//! Stripe webhook handler
//!
//! POST /stripe/webhook : raw body, verified against `Stripe-Signature`

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::error::BillingError;
use crate::state::AppState;
use crate::webhook::WebhookOutcome;

/// Stripe only looks at the status code: 2xx acknowledges, anything else is retried
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    match state.webhooks.process(&body, signature).await {
        Ok(WebhookOutcome::Applied {
            event_id,
            event_type,
        }) => {
            tracing::info!(%event_id, %event_type, "Webhook event applied");
            StatusCode::OK
        }
        Ok(_) => StatusCode::OK,
        Err(BillingError::Signature(reason)) => {
            tracing::warn!(%reason, "Webhook signature verification failed");
            StatusCode::BAD_REQUEST
        }
        Err(e @ BillingError::Validation { .. }) => {
            tracing::warn!(error = %e, "Rejected webhook payload");
            StatusCode::BAD_REQUEST
        }
        // Already logged by the processor; a 5xx makes Stripe redeliver
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
