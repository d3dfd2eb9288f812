//! Stripe integration via REST API (no SDK dependency)
//!
//! [`StripeClient`] speaks form-encoded HTTP with basic auth. Services only
//! see the [`PaymentProcessor`] trait, so tests can swap in a recording fake.

pub mod events;
pub mod signature;

#[cfg(test)]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::billing::fees::Money;
use crate::config::StripeConfig;

pub use events::{EventKind, StripeEvent};
pub use signature::{SignatureError, verify_webhook_signature};

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("stripe request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Error body returned by the API, surfaced verbatim
    #[error("stripe api error ({status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("unexpected stripe response: {0}")]
    Decode(String),
}

// ── Requests ──

/// Marketplace charge routed to a connected account
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntentParams {
    pub amount: Money,
    pub currency: String,
    pub application_fee: Money,
    pub destination: String,
    pub description: Option<String>,
    pub metadata: Vec<(String, String)>,
    pub idempotency_key: String,
}

impl PaymentIntentParams {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("amount".into(), self.amount.cents().to_string()),
            ("currency".into(), self.currency.clone()),
            (
                "application_fee_amount".into(),
                self.application_fee.cents().to_string(),
            ),
            ("transfer_data[destination]".into(), self.destination.clone()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        if let Some(ref d) = self.description {
            form.push(("description".into(), d.clone()));
        }
        push_metadata(&mut form, "metadata", &self.metadata);
        form
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub price_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutKind {
    /// One-off marketplace payment with an application fee
    Payment {
        product_name: String,
        amount: Money,
        currency: String,
        application_fee: Money,
        destination: String,
    },
    Subscription { items: Vec<LineItem> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutParams {
    pub kind: CheckoutKind,
    pub customer_id: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Copied onto the session and onto the payment intent / subscription
    pub metadata: Vec<(String, String)>,
    pub idempotency_key: Option<String>,
}

impl CheckoutParams {
    pub fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("success_url".into(), self.success_url.clone()),
            ("cancel_url".into(), self.cancel_url.clone()),
        ];
        if let Some(ref c) = self.customer_id {
            form.push(("customer".into(), c.clone()));
        }
        match &self.kind {
            CheckoutKind::Payment {
                product_name,
                amount,
                currency,
                application_fee,
                destination,
            } => {
                form.extend([
                    ("mode".into(), "payment".into()),
                    ("line_items[0][quantity]".into(), "1".into()),
                    (
                        "line_items[0][price_data][currency]".into(),
                        currency.clone(),
                    ),
                    (
                        "line_items[0][price_data][unit_amount]".into(),
                        amount.cents().to_string(),
                    ),
                    (
                        "line_items[0][price_data][product_data][name]".into(),
                        product_name.clone(),
                    ),
                    (
                        "payment_intent_data[application_fee_amount]".into(),
                        application_fee.cents().to_string(),
                    ),
                    (
                        "payment_intent_data[transfer_data][destination]".into(),
                        destination.clone(),
                    ),
                ]);
                push_metadata(&mut form, "payment_intent_data[metadata]", &self.metadata);
            }
            CheckoutKind::Subscription { items } => {
                form.push(("mode".into(), "subscription".into()));
                for (i, item) in items.iter().enumerate() {
                    form.push((format!("line_items[{i}][price]"), item.price_id.clone()));
                    form.push((format!("line_items[{i}][quantity]"), item.quantity.to_string()));
                }
                push_metadata(&mut form, "subscription_data[metadata]", &self.metadata);
            }
        }
        push_metadata(&mut form, "metadata", &self.metadata);
        form
    }
}

fn push_metadata(form: &mut Vec<(String, String)>, prefix: &str, metadata: &[(String, String)]) {
    for (k, v) in metadata {
        form.push((format!("{prefix}[{k}]"), v.clone()));
    }
}

// ── Responses ──

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCheckout {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionItem {
    pub id: String,
    pub price_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSubscription {
    pub id: String,
    pub status: String,
    pub items: Vec<SubscriptionItem>,
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    status: String,
    items: RawList<RawSubscriptionItem>,
}

#[derive(Deserialize)]
struct RawList<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct RawSubscriptionItem {
    id: String,
    quantity: Option<i64>,
    price: RawPrice,
}

#[derive(Deserialize)]
struct RawPrice {
    id: String,
}

#[derive(Deserialize)]
struct RawId {
    id: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn create_customer(
        &self,
        email: Option<&str>,
        metadata: &[(String, String)],
    ) -> Result<String, StripeError>;

    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<CreatedIntent, StripeError>;

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CreatedCheckout, StripeError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, StripeError>;

    /// Absolute quantity write on an existing item
    async fn set_item_quantity(&self, item_id: &str, quantity: i64) -> Result<(), StripeError>;

    async fn add_subscription_item(
        &self,
        subscription_id: &str,
        price_id: &str,
        quantity: i64,
    ) -> Result<(), StripeError>;
}

#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, StripeError> {
        Self::with_timeout(&config.secret_key, &config.api_base, config.timeout)
    }

    pub fn with_timeout(
        secret_key: &str,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, StripeError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            secret_key: secret_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, StripeError> {
        let mut req = self
            .http
            .post(format!("{}{path}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form);
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        Self::decode(req.send().await?).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, StripeError> {
        let resp = self
            .http
            .get(format!("{}{path}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StripeError> {
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            let (message, code) = match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(e) => (
                    e.error
                        .message
                        .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
                    e.error.code,
                ),
                Err(_) => (String::from_utf8_lossy(&body).into_owned(), None),
            };
            return Err(StripeError::Api {
                status: status.as_u16(),
                code,
                message,
            });
        }
        serde_json::from_slice(&body).map_err(|e| StripeError::Decode(e.to_string()))
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_customer(
        &self,
        email: Option<&str>,
        metadata: &[(String, String)],
    ) -> Result<String, StripeError> {
        let mut form = Vec::new();
        if let Some(email) = email {
            form.push(("email".to_string(), email.to_string()));
        }
        push_metadata(&mut form, "metadata", metadata);
        let created: RawId = self.post_form("/v1/customers", &form, None).await?;
        Ok(created.id)
    }

    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<CreatedIntent, StripeError> {
        self.post_form(
            "/v1/payment_intents",
            &params.to_form(),
            Some(&params.idempotency_key),
        )
        .await
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CreatedCheckout, StripeError> {
        self.post_form(
            "/v1/checkout/sessions",
            &params.to_form(),
            params.idempotency_key.as_deref(),
        )
        .await
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, StripeError> {
        let raw: RawSubscription = self
            .get(&format!("/v1/subscriptions/{subscription_id}"))
            .await?;
        Ok(RemoteSubscription {
            id: raw.id,
            status: raw.status,
            items: raw
                .items
                .data
                .into_iter()
                .map(|i| SubscriptionItem {
                    id: i.id,
                    price_id: i.price.id,
                    quantity: i.quantity.unwrap_or(0),
                })
                .collect(),
        })
    }

    async fn set_item_quantity(&self, item_id: &str, quantity: i64) -> Result<(), StripeError> {
        let form = [("quantity".to_string(), quantity.to_string())];
        let _: RawId = self
            .post_form(&format!("/v1/subscription_items/{item_id}"), &form, None)
            .await?;
        Ok(())
    }

    async fn add_subscription_item(
        &self,
        subscription_id: &str,
        price_id: &str,
        quantity: i64,
    ) -> Result<(), StripeError> {
        let form = [
            ("subscription".to_string(), subscription_id.to_string()),
            ("price".to_string(), price_id.to_string()),
            ("quantity".to_string(), quantity.to_string()),
        ];
        let key = format!("add-item-{subscription_id}-{price_id}");
        let _: RawId = self
            .post_form("/v1/subscription_items", &form, Some(&key))
            .await?;
        Ok(())
    }
}
