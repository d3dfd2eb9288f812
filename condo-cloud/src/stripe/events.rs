//! Typed Stripe webhook events
//!
//! The raw JSON envelope is mapped into [`StripeEvent`] before any business
//! logic runs. Only the fields the handlers need are extracted; anything
//! else is ignored, and unknown event types become [`EventKind::Unhandled`].

use std::collections::HashMap;

use serde::Deserialize;
use shared::billing::SubscriptionStatus;
use shared::util::stripe_secs_to_millis;

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("invalid event JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{event_type} payload invalid: {source}")]
    Object {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StripeEvent {
    pub id: String,
    pub event_type: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// customer.subscription.created / customer.subscription.updated
    SubscriptionChanged(SubscriptionSnapshot),
    /// customer.subscription.deleted
    SubscriptionDeleted(SubscriptionSnapshot),
    PaymentSucceeded(PaymentIntentRef),
    PaymentFailed(PaymentIntentRef),
    /// invoice.payment_failed for a subscription invoice
    InvoicePaymentFailed { subscription_id: String },
    CheckoutCompleted(CheckoutSnapshot),
    Unhandled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionSnapshot {
    pub id: String,
    pub customer_id: Option<String>,
    pub status: SubscriptionStatus,
    /// Unix milliseconds
    pub trial_end: Option<i64>,
    /// Unix milliseconds
    pub current_period_end: Option<i64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntentRef {
    pub id: String,
    /// Our payment row id, set when the intent was created by checkout
    pub payment_record_id: Option<String>,
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSnapshot {
    pub session_id: String,
    pub mode: CheckoutSessionMode,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: Option<String>,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutSessionMode {
    Payment,
    Subscription,
    Setup,
}

// ── Wire shapes ──

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    customer: Option<String>,
    status: String,
    trial_end: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawPaymentIntent {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    last_payment_error: Option<RawPaymentError>,
}

#[derive(Deserialize)]
struct RawPaymentError {
    message: Option<String>,
}

#[derive(Deserialize)]
struct RawInvoice {
    subscription: Option<String>,
    /// Newer API versions moved the subscription under `parent`
    parent: Option<RawInvoiceParent>,
}

#[derive(Deserialize)]
struct RawInvoiceParent {
    subscription_details: Option<RawSubscriptionDetails>,
}

#[derive(Deserialize)]
struct RawSubscriptionDetails {
    subscription: Option<String>,
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    id: String,
    mode: CheckoutSessionMode,
    payment_status: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripeEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, EventParseError> {
        let raw: RawEvent = serde_json::from_slice(payload)?;
        let kind = EventKind::from_object(&raw.event_type, raw.data.object).map_err(|source| {
            EventParseError::Object {
                event_type: raw.event_type.clone(),
                source,
            }
        })?;
        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            kind,
        })
    }
}

impl EventKind {
    fn from_object(event_type: &str, object: serde_json::Value) -> Result<Self, serde_json::Error> {
        let kind = match event_type {
            "customer.subscription.created" | "customer.subscription.updated" => {
                match subscription_snapshot(serde_json::from_value(object)?) {
                    Some(s) => Self::SubscriptionChanged(s),
                    None => Self::Unhandled,
                }
            }
            "customer.subscription.deleted" => {
                match subscription_snapshot(serde_json::from_value(object)?) {
                    Some(s) => Self::SubscriptionDeleted(s),
                    None => Self::Unhandled,
                }
            }
            "payment_intent.succeeded" => {
                Self::PaymentSucceeded(payment_ref(serde_json::from_value(object)?))
            }
            "payment_intent.payment_failed" => {
                Self::PaymentFailed(payment_ref(serde_json::from_value(object)?))
            }
            "invoice.payment_failed" => {
                let invoice: RawInvoice = serde_json::from_value(object)?;
                let subscription_id = invoice.subscription.or_else(|| {
                    invoice
                        .parent
                        .and_then(|p| p.subscription_details)
                        .and_then(|d| d.subscription)
                });
                match subscription_id {
                    Some(subscription_id) => Self::InvoicePaymentFailed { subscription_id },
                    // One-off invoice, nothing to sync
                    None => Self::Unhandled,
                }
            }
            "checkout.session.completed" => {
                let s: RawCheckoutSession = serde_json::from_value(object)?;
                Self::CheckoutCompleted(CheckoutSnapshot {
                    session_id: s.id,
                    mode: s.mode,
                    payment_status: s.payment_status,
                    customer_id: s.customer,
                    subscription_id: s.subscription,
                    metadata: s.metadata,
                })
            }
            _ => Self::Unhandled,
        };
        Ok(kind)
    }
}

fn subscription_snapshot(raw: RawSubscription) -> Option<SubscriptionSnapshot> {
    let Some(status) = SubscriptionStatus::from_db(&raw.status) else {
        tracing::warn!(subscription_id = %raw.id, status = %raw.status, "Unknown subscription status");
        return None;
    };
    Some(SubscriptionSnapshot {
        id: raw.id,
        customer_id: raw.customer,
        status,
        trial_end: raw.trial_end.map(stripe_secs_to_millis),
        current_period_end: raw.current_period_end.map(stripe_secs_to_millis),
        metadata: raw.metadata,
    })
}

fn payment_ref(raw: RawPaymentIntent) -> PaymentIntentRef {
    PaymentIntentRef {
        id: raw.id,
        payment_record_id: raw.metadata.get("payment_record_id").cloned(),
        failure_message: raw.last_payment_error.and_then(|e| e.message),
    }
}
