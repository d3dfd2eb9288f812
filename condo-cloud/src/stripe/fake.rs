//! Recording [`PaymentProcessor`] for tests

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{
    CheckoutParams, CreatedCheckout, CreatedIntent, PaymentIntentParams, PaymentProcessor,
    RemoteSubscription, StripeError, SubscriptionItem,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateCustomer { email: Option<String> },
    PaymentIntent(PaymentIntentParams),
    Checkout(CheckoutParams),
    RetrieveSubscription(String),
    SetQuantity { item_id: String, quantity: i64 },
    AddItem {
        subscription_id: String,
        price_id: String,
        quantity: i64,
    },
}

#[derive(Default)]
pub struct FakeProcessor {
    calls: Mutex<Vec<Call>>,
    subscriptions: Mutex<HashMap<String, RemoteSubscription>>,
    /// Remaining injected failures per operation
    failures: Mutex<HashMap<&'static str, u32>>,
    seq: AtomicU64,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls of `operation`
    pub fn fail(&self, operation: &'static str, times: u32) {
        self.failures.lock().unwrap().insert(operation, times);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn quantity_updates(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SetQuantity { quantity, .. } => Some(quantity),
                _ => None,
            })
            .collect()
    }

    /// Register a subscription with a single per-condo item
    pub fn add_subscription(&self, id: &str, price_id: &str, quantity: i64) {
        self.subscriptions.lock().unwrap().insert(
            id.to_string(),
            RemoteSubscription {
                id: id.to_string(),
                status: "active".into(),
                items: vec![SubscriptionItem {
                    id: format!("si_{id}"),
                    price_id: price_id.to_string(),
                    quantity,
                }],
            },
        );
    }

    pub fn item_quantity(&self, subscription_id: &str) -> Option<i64> {
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .and_then(|s| s.items.first().map(|i| i.quantity))
    }

    fn record(&self, operation: &'static str, call: Call) -> Result<(), StripeError> {
        self.calls.lock().unwrap().push(call);
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(operation)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(StripeError::Api {
                status: 402,
                code: Some("card_declined".into()),
                message: "Your card was declined.".into(),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}_{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_customer(
        &self,
        email: Option<&str>,
        _metadata: &[(String, String)],
    ) -> Result<String, StripeError> {
        self.record(
            "create_customer",
            Call::CreateCustomer {
                email: email.map(String::from),
            },
        )?;
        Ok(self.next_id("cus"))
    }

    async fn create_payment_intent(
        &self,
        params: &PaymentIntentParams,
    ) -> Result<CreatedIntent, StripeError> {
        self.record("create_payment_intent", Call::PaymentIntent(params.clone()))?;
        let id = self.next_id("pi");
        Ok(CreatedIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
        })
    }

    async fn create_checkout_session(
        &self,
        params: &CheckoutParams,
    ) -> Result<CreatedCheckout, StripeError> {
        self.record("create_checkout_session", Call::Checkout(params.clone()))?;
        let id = self.next_id("cs");
        Ok(CreatedCheckout {
            url: Some(format!("https://checkout.stripe.test/{id}")),
            id,
        })
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<RemoteSubscription, StripeError> {
        self.record(
            "retrieve_subscription",
            Call::RetrieveSubscription(subscription_id.to_string()),
        )?;
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| StripeError::Api {
                status: 404,
                code: Some("resource_missing".into()),
                message: format!("No such subscription: '{subscription_id}'"),
            })
    }

    async fn set_item_quantity(&self, item_id: &str, quantity: i64) -> Result<(), StripeError> {
        self.record(
            "set_item_quantity",
            Call::SetQuantity {
                item_id: item_id.to_string(),
                quantity,
            },
        )?;
        for sub in self.subscriptions.lock().unwrap().values_mut() {
            for item in sub.items.iter_mut().filter(|i| i.id == item_id) {
                item.quantity = quantity;
            }
        }
        Ok(())
    }

    async fn add_subscription_item(
        &self,
        subscription_id: &str,
        price_id: &str,
        quantity: i64,
    ) -> Result<(), StripeError> {
        self.record(
            "add_subscription_item",
            Call::AddItem {
                subscription_id: subscription_id.to_string(),
                price_id: price_id.to_string(),
                quantity,
            },
        )?;
        let item_id = self.next_id("si");
        if let Some(sub) = self.subscriptions.lock().unwrap().get_mut(subscription_id) {
            sub.items.push(SubscriptionItem {
                id: item_id,
                price_id: price_id.to_string(),
                quantity,
            });
        }
        Ok(())
    }
}
