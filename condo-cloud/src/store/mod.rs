//! Persistence seam for the billing services
//!
//! Services depend on [`BillingStore`] rather than a pool so they can run
//! against PostgreSQL ([`PgStore`]) in production and an in-memory store in
//! tests. Every method is a single absolute read or write.

mod pg;

#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use shared::billing::{PaymentStatus, SubscriptionStatus};

pub use crate::db::admins::Admin;
pub use crate::db::condominiums::Condominium;
pub use crate::db::payments::{Payment, PaymentTotals};
pub use crate::db::subscriptions::Subscription;
pub use crate::db::suppliers::{PlanUpdate, Supplier};
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait BillingStore: Send + Sync {
    // ── Administrators ──
    async fn find_admin(&self, admin_id: &str) -> StoreResult<Option<Admin>>;
    async fn find_admin_by_subscription(&self, subscription_id: &str)
    -> StoreResult<Option<Admin>>;
    async fn list_admin_ids(&self) -> StoreResult<Vec<String>>;
    async fn set_admin_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
        trial_ends_at: Option<i64>,
    ) -> StoreResult<()>;
    /// Only writes when no status was ever recorded
    async fn init_admin_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<bool>;
    async fn set_admin_customer(&self, admin_id: &str, customer_id: &str) -> StoreResult<()>;
    /// Attach Stripe ids to the admin and their subscription row
    async fn link_admin_stripe(
        &self,
        admin_id: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> StoreResult<()>;

    // ── Condominiums ──
    async fn find_condominium(&self, condo_id: &str) -> StoreResult<Option<Condominium>>;
    async fn count_condominiums(&self, admin_id: &str) -> StoreResult<i64>;

    // ── Suppliers ──
    async fn find_supplier(&self, supplier_id: &str) -> StoreResult<Option<Supplier>>;
    async fn find_supplier_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<Supplier>>;
    async fn update_supplier_plan(
        &self,
        supplier_id: &str,
        update: &PlanUpdate<'_>,
    ) -> StoreResult<()>;
    async fn set_supplier_customer(&self, supplier_id: &str, customer_id: &str)
    -> StoreResult<()>;

    // ── Subscriptions ──
    async fn upsert_subscription(&self, sub: &Subscription) -> StoreResult<Subscription>;
    async fn find_subscription(&self, admin_id: &str) -> StoreResult<Option<Subscription>>;
    async fn set_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<()>;

    // ── Payments ──
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()>;
    async fn find_payment(&self, stripe_payment_id: &str) -> StoreResult<Option<Payment>>;
    /// Returns rows changed; succeeded payments are never touched
    async fn update_payment_status(
        &self,
        stripe_payment_id: &str,
        status: PaymentStatus,
    ) -> StoreResult<u64>;
    async fn update_payment_status_by_id(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> StoreResult<u64>;
    async fn payment_totals(&self, admin_id: &str) -> StoreResult<PaymentTotals>;

    // ── Webhook ledger ──
    async fn is_event_processed(&self, event_id: &str) -> StoreResult<bool>;
    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> StoreResult<bool>;
}
