use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use shared::billing::{PaymentStatus, SubscriptionStatus};
use shared::util::now_millis;
use sqlx::PgPool;

use super::{
    Admin, BillingStore, Condominium, Payment, PaymentTotals, PlanUpdate, StoreError,
    StoreResult, Subscription, Supplier,
};
use crate::db;

/// PostgreSQL-backed store; every query is bounded by `timeout`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    async fn bounded<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout(self.timeout)),
        }
    }
}

#[async_trait]
impl BillingStore for PgStore {
    async fn find_admin(&self, admin_id: &str) -> StoreResult<Option<Admin>> {
        self.bounded(db::admins::find_by_id(&self.pool, admin_id))
            .await
    }

    async fn find_admin_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<Admin>> {
        self.bounded(db::admins::find_by_subscription(&self.pool, subscription_id))
            .await
    }

    async fn list_admin_ids(&self) -> StoreResult<Vec<String>> {
        self.bounded(db::admins::list_ids(&self.pool)).await
    }

    async fn set_admin_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
        trial_ends_at: Option<i64>,
    ) -> StoreResult<()> {
        self.bounded(db::admins::update_subscription_status(
            &self.pool,
            admin_id,
            status.as_db(),
            trial_ends_at,
        ))
        .await
    }

    async fn init_admin_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<bool> {
        self.bounded(db::admins::init_subscription_status(
            &self.pool,
            admin_id,
            status.as_db(),
        ))
        .await
    }

    async fn set_admin_customer(&self, admin_id: &str, customer_id: &str) -> StoreResult<()> {
        self.bounded(db::admins::set_stripe_customer(
            &self.pool,
            admin_id,
            customer_id,
        ))
        .await
    }

    async fn link_admin_stripe(
        &self,
        admin_id: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> StoreResult<()> {
        self.bounded(db::admins::link_stripe(
            &self.pool,
            admin_id,
            customer_id,
            subscription_id,
            now_millis(),
        ))
        .await
    }

    async fn find_condominium(&self, condo_id: &str) -> StoreResult<Option<Condominium>> {
        self.bounded(db::condominiums::find_by_id(&self.pool, condo_id))
            .await
    }

    async fn count_condominiums(&self, admin_id: &str) -> StoreResult<i64> {
        self.bounded(db::condominiums::count_by_admin(&self.pool, admin_id))
            .await
    }

    async fn find_supplier(&self, supplier_id: &str) -> StoreResult<Option<Supplier>> {
        self.bounded(db::suppliers::find_by_id(&self.pool, supplier_id))
            .await
    }

    async fn find_supplier_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<Supplier>> {
        self.bounded(db::suppliers::find_by_subscription(
            &self.pool,
            subscription_id,
        ))
        .await
    }

    async fn update_supplier_plan(
        &self,
        supplier_id: &str,
        update: &PlanUpdate<'_>,
    ) -> StoreResult<()> {
        self.bounded(db::suppliers::update_plan(&self.pool, supplier_id, update))
            .await
    }

    async fn set_supplier_customer(
        &self,
        supplier_id: &str,
        customer_id: &str,
    ) -> StoreResult<()> {
        self.bounded(db::suppliers::set_stripe_customer(
            &self.pool,
            supplier_id,
            customer_id,
        ))
        .await
    }

    async fn upsert_subscription(&self, sub: &Subscription) -> StoreResult<Subscription> {
        self.bounded(db::subscriptions::upsert(&self.pool, sub))
            .await
    }

    async fn find_subscription(&self, admin_id: &str) -> StoreResult<Option<Subscription>> {
        self.bounded(db::subscriptions::find_by_admin(&self.pool, admin_id))
            .await
    }

    async fn set_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<()> {
        self.bounded(db::subscriptions::update_status(
            &self.pool,
            admin_id,
            status.as_db(),
            now_millis(),
        ))
        .await
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        self.bounded(db::payments::insert(&self.pool, payment))
            .await
    }

    async fn find_payment(&self, stripe_payment_id: &str) -> StoreResult<Option<Payment>> {
        self.bounded(db::payments::find_by_stripe_id(
            &self.pool,
            stripe_payment_id,
        ))
        .await
    }

    async fn update_payment_status(
        &self,
        stripe_payment_id: &str,
        status: PaymentStatus,
    ) -> StoreResult<u64> {
        self.bounded(db::payments::update_status_by_stripe_id(
            &self.pool,
            stripe_payment_id,
            status.as_db(),
            now_millis(),
        ))
        .await
    }

    async fn update_payment_status_by_id(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> StoreResult<u64> {
        self.bounded(db::payments::update_status_by_id(
            &self.pool,
            payment_id,
            status.as_db(),
            now_millis(),
        ))
        .await
    }

    async fn payment_totals(&self, admin_id: &str) -> StoreResult<PaymentTotals> {
        self.bounded(db::payments::totals_for_admin(&self.pool, admin_id))
            .await
    }

    async fn is_event_processed(&self, event_id: &str) -> StoreResult<bool> {
        self.bounded(db::webhook_events::is_processed(&self.pool, event_id))
            .await
    }

    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> StoreResult<bool> {
        self.bounded(db::webhook_events::mark_processed(
            &self.pool,
            event_id,
            event_type,
            now_millis(),
        ))
        .await
    }
}
