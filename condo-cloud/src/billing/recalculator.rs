//! Subscription recalculation
//!
//! Counts an administrator's condominiums, prices them with the
//! [`FeeSchedule`], upserts the subscription row and pushes the new
//! quantity to Stripe. A failed Stripe push never rolls back the upsert;
//! it is retried on a background task until it lands or attempts run out.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::billing::SubscriptionStatus;
use shared::util::now_millis;

use crate::billing::fees::{FeeSchedule, SubscriptionPricing};
use crate::error::{BillingError, BillingResult, DependencyExt, Resource};
use crate::store::{BillingStore, Subscription};
use crate::stripe::{PaymentProcessor, StripeError};

/// Backoff for the asynchronous Stripe quantity sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the inline one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RecalculateOptions {
    /// Push the new quantity to Stripe when the admin has a subscription
    pub sync_stripe: bool,
}

impl Default for RecalculateOptions {
    fn default() -> Self {
        Self { sync_stripe: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeSync {
    /// No Stripe subscription yet, or sync not requested
    Skipped,
    /// Quantity confirmed inline
    Synced,
    /// Inline push failed, retrying in the background
    Scheduled,
    /// Inline push failed and retries are disabled
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recalculation {
    pub admin_id: String,
    pub pricing: SubscriptionPricing,
    pub status: Option<String>,
    pub stripe_sync: StripeSync,
    #[serde(skip)]
    pub subscription: Subscription,
}

/// Outcome of one quantity push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuantitySync {
    Unchanged,
    Updated,
    Added,
}

#[derive(Clone)]
pub struct SubscriptionRecalculator {
    store: Arc<dyn BillingStore>,
    processor: Arc<dyn PaymentProcessor>,
    fees: FeeSchedule,
    condo_price_id: Option<String>,
    retry: RetryPolicy,
}

impl SubscriptionRecalculator {
    pub fn new(
        store: Arc<dyn BillingStore>,
        processor: Arc<dyn PaymentProcessor>,
        fees: FeeSchedule,
        condo_price_id: Option<String>,
    ) -> Self {
        Self {
            store,
            processor,
            fees,
            condo_price_id,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub async fn recalculate_admin_subscription(
        &self,
        admin_id: &str,
        opts: RecalculateOptions,
    ) -> BillingResult<Recalculation> {
        let (admin, condo_count) = tokio::try_join!(
            async {
                self.store
                    .find_admin(admin_id)
                    .await
                    .dependency("load administrator")
            },
            async {
                self.store
                    .count_condominiums(admin_id)
                    .await
                    .dependency("count condominiums")
            },
        )?;
        let admin = admin.ok_or_else(|| BillingError::not_found(Resource::Admin, admin_id))?;

        let pricing = self.fees.calculate_subscription_total(condo_count);
        let status = admin
            .subscription_status
            .clone()
            .unwrap_or_else(|| SubscriptionStatus::Trialing.as_db().to_string());

        let row = Subscription {
            admin_id: admin_id.to_string(),
            base_fee_cents: pricing.base.cents(),
            per_unit_fee_cents: pricing.per_condo.cents(),
            condo_count: pricing.condo_count,
            total_price_cents: pricing.total.cents(),
            stripe_subscription_id: admin.stripe_subscription_id.clone(),
            stripe_customer_id: admin.stripe_customer_id.clone(),
            status: Some(status),
            updated_at: now_millis(),
        };
        let subscription = self
            .store
            .upsert_subscription(&row)
            .await
            .dependency("upsert subscription")?;

        if admin.subscription_status.is_none() {
            let initialised = self
                .store
                .init_admin_subscription_status(admin_id, SubscriptionStatus::Trialing)
                .await
                .dependency("initialise subscription status")?;
            if initialised {
                tracing::info!(admin_id, "Administrator starts trialing");
            }
        }

        let stripe_sync = match admin.stripe_subscription_id {
            Some(sub_id) if opts.sync_stripe => {
                self.sync_or_schedule(admin_id, sub_id, pricing.condo_count)
                    .await
            }
            _ => StripeSync::Skipped,
        };

        tracing::info!(
            admin_id,
            condo_count = pricing.condo_count,
            total = %pricing.total,
            ?stripe_sync,
            "Subscription recalculated"
        );

        Ok(Recalculation {
            admin_id: admin_id.to_string(),
            pricing,
            status: subscription.status.clone(),
            stripe_sync,
            subscription,
        })
    }

    async fn sync_or_schedule(
        &self,
        admin_id: &str,
        subscription_id: String,
        quantity: i64,
    ) -> StripeSync {
        match self.sync_quantity(&subscription_id, quantity).await {
            Ok(outcome) => {
                tracing::debug!(admin_id, %subscription_id, ?outcome, "Stripe quantity synced");
                StripeSync::Synced
            }
            Err(e) if self.retry.max_attempts > 1 => {
                tracing::warn!(
                    admin_id,
                    %subscription_id,
                    "Stripe quantity sync failed, scheduling retry: {e}"
                );
                let this = self.clone();
                let admin_id = admin_id.to_string();
                tokio::spawn(async move {
                    if let Err(e) = this.sync_with_retry(&subscription_id, quantity).await {
                        tracing::error!(
                            %admin_id,
                            %subscription_id,
                            quantity,
                            "Stripe quantity sync gave up: {e}"
                        );
                    }
                });
                StripeSync::Scheduled
            }
            Err(e) => {
                tracing::error!(admin_id, %subscription_id, "Stripe quantity sync failed: {e}");
                StripeSync::Failed
            }
        }
    }

    /// Remaining attempts after the inline one, with exponential backoff
    async fn sync_with_retry(&self, subscription_id: &str, quantity: i64) -> Result<(), StripeError> {
        let mut delay = self.retry.initial_delay;
        let mut attempt = 1;
        loop {
            tokio::time::sleep(delay).await;
            attempt += 1;
            match self.sync_quantity(subscription_id, quantity).await {
                Ok(_) => {
                    tracing::info!(subscription_id, quantity, attempt, "Stripe quantity synced on retry");
                    return Ok(());
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Stripe quantity sync attempt failed, retrying: {e}"
                    );
                    delay = (delay * 2).min(self.retry.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Set (never increment) the per-condo item quantity
    async fn sync_quantity(
        &self,
        subscription_id: &str,
        quantity: i64,
    ) -> Result<QuantitySync, StripeError> {
        let remote = self.processor.retrieve_subscription(subscription_id).await?;
        let item = match self.condo_price_id.as_deref() {
            Some(price_id) => remote.items.iter().find(|i| i.price_id == price_id),
            None if remote.items.len() == 1 => remote.items.first(),
            None => None,
        };

        match (item, self.condo_price_id.as_deref()) {
            (Some(item), _) if item.quantity == quantity => Ok(QuantitySync::Unchanged),
            (Some(item), _) => {
                self.processor
                    .set_item_quantity(&item.id, quantity)
                    .await?;
                Ok(QuantitySync::Updated)
            }
            (None, _) if quantity == 0 => Ok(QuantitySync::Unchanged),
            (None, Some(price_id)) => {
                self.processor
                    .add_subscription_item(subscription_id, price_id, quantity)
                    .await?;
                Ok(QuantitySync::Added)
            }
            (None, None) => Err(StripeError::Decode(format!(
                "subscription {subscription_id} has no per-condominium item"
            ))),
        }
    }
}
