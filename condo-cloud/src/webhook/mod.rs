//! Stripe webhook processing
//!
//! Flow: verify signature → parse typed event → ledger check → apply →
//! record in ledger. The event id is recorded only after its handler
//! succeeded, so a failed delivery is retried by Stripe and applied then.

mod handlers;

use std::sync::Arc;

use serde::Serialize;
use shared::error::ErrorCode;

use crate::error::{BillingError, BillingResult, DependencyExt};
use crate::store::BillingStore;
use crate::stripe::{StripeEvent, verify_webhook_signature};

pub use handlers::Effect;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { event_id: String, event_type: String },
    /// Known type, but nothing local referenced
    Skipped { event_id: String, event_type: String },
    Ignored { event_id: String, event_type: String },
    Duplicate { event_id: String },
}

#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn BillingStore>,
    secret: String,
}

impl WebhookProcessor {
    pub fn new(store: Arc<dyn BillingStore>, secret: impl Into<String>) -> Self {
        Self {
            store,
            secret: secret.into(),
        }
    }

    pub async fn process(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> BillingResult<WebhookOutcome> {
        self.process_at(payload, signature, shared::util::now_secs())
            .await
    }

    pub async fn process_at(
        &self,
        payload: &[u8],
        signature: Option<&str>,
        now_secs: i64,
    ) -> BillingResult<WebhookOutcome> {
        let signature = signature.ok_or_else(|| {
            BillingError::Signature("missing Stripe-Signature header".to_string())
        })?;
        verify_webhook_signature(payload, signature, &self.secret, now_secs)
            .map_err(|e| BillingError::Signature(e.to_string()))?;

        let event = StripeEvent::parse(payload).map_err(|e| BillingError::Validation {
            code: ErrorCode::WebhookPayloadInvalid,
            message: e.to_string(),
        })?;

        if self
            .store
            .is_event_processed(&event.id)
            .await
            .dependency("check webhook ledger")?
        {
            tracing::info!(event_id = %event.id, event_type = %event.event_type, "Duplicate webhook event, skipping");
            return Ok(WebhookOutcome::Duplicate { event_id: event.id });
        }

        let effect = handlers::apply(self.store.as_ref(), &event.kind)
            .await
            .inspect_err(|e| {
                tracing::error!(event_id = %event.id, event_type = %event.event_type, error = %e, "Webhook handler failed");
            })?;

        // A concurrent delivery may have won the race; both applied the same absolute writes
        let first = self
            .store
            .mark_event_processed(&event.id, &event.event_type)
            .await
            .dependency("record webhook event")?;
        if !first {
            tracing::debug!(event_id = %event.id, "Webhook event recorded concurrently");
        }

        let StripeEvent { id, event_type, .. } = event;
        Ok(match effect {
            Effect::Applied => WebhookOutcome::Applied {
                event_id: id,
                event_type,
            },
            Effect::NoTarget => WebhookOutcome::Skipped {
                event_id: id,
                event_type,
            },
            Effect::Unhandled => {
                tracing::debug!(event_id = %id, %event_type, "Unhandled webhook event type");
                WebhookOutcome::Ignored {
                    event_id: id,
                    event_type,
                }
            }
        })
    }
}
