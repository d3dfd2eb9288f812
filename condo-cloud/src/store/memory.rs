//! In-memory [`BillingStore`] for service and router tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use shared::billing::{PaymentStatus, SubscriptionStatus};
use shared::util::now_millis;

use super::{
    Admin, BillingStore, Condominium, Payment, PaymentTotals, PlanUpdate, StoreError,
    StoreResult, Subscription, Supplier,
};

#[derive(Default)]
struct Tables {
    admins: HashMap<String, Admin>,
    condominiums: HashMap<String, Condominium>,
    suppliers: HashMap<String, Supplier>,
    subscriptions: HashMap<String, Subscription>,
    /// Keyed by stripe_payment_id, mirroring the unique constraint
    payments: HashMap<String, Payment>,
    processed_events: HashMap<String, String>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    failing: Mutex<HashSet<&'static str>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail until [`Self::recover`] is called
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    fn check(&self, operation: &'static str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(StoreError::Unavailable(format!("{operation} failed")));
        }
        Ok(())
    }

    pub fn seed_admin(&self, id: &str, stripe_account_id: Option<&str>) {
        self.tables.lock().unwrap().admins.insert(
            id.to_string(),
            Admin {
                id: id.to_string(),
                email: Some(format!("{id}@example.com")),
                stripe_customer_id: None,
                stripe_subscription_id: None,
                stripe_account_id: stripe_account_id.map(String::from),
                subscription_status: None,
                trial_ends_at: None,
            },
        );
    }

    pub fn update_admin(&self, id: &str, f: impl FnOnce(&mut Admin)) {
        if let Some(admin) = self.tables.lock().unwrap().admins.get_mut(id) {
            f(admin);
        }
    }

    pub fn seed_condominium(&self, id: &str, admin_id: &str) {
        self.tables.lock().unwrap().condominiums.insert(
            id.to_string(),
            Condominium {
                id: id.to_string(),
                admin_id: admin_id.to_string(),
            },
        );
    }

    pub fn seed_supplier(&self, id: &str, condo_id: Option<&str>) {
        self.tables.lock().unwrap().suppliers.insert(
            id.to_string(),
            Supplier {
                id: id.to_string(),
                condo_id: condo_id.map(String::from),
                email: None,
                plan: "free".to_string(),
                plan_status: None,
                stripe_subscription_id: None,
                stripe_customer_id: None,
                plan_renews_at: None,
            },
        );
    }

    pub fn update_supplier(&self, id: &str, f: impl FnOnce(&mut Supplier)) {
        if let Some(supplier) = self.tables.lock().unwrap().suppliers.get_mut(id) {
            f(supplier);
        }
    }

    pub fn admin(&self, id: &str) -> Option<Admin> {
        self.tables.lock().unwrap().admins.get(id).cloned()
    }

    pub fn supplier(&self, id: &str) -> Option<Supplier> {
        self.tables.lock().unwrap().suppliers.get(id).cloned()
    }

    pub fn subscription(&self, admin_id: &str) -> Option<Subscription> {
        self.tables
            .lock()
            .unwrap()
            .subscriptions
            .get(admin_id)
            .cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.tables.lock().unwrap().subscriptions.len()
    }

    pub fn payments(&self) -> Vec<Payment> {
        self.tables
            .lock()
            .unwrap()
            .payments
            .values()
            .cloned()
            .collect()
    }

    pub fn insert_payment_row(&self, payment: Payment) {
        self.tables
            .lock()
            .unwrap()
            .payments
            .insert(payment.stripe_payment_id.clone(), payment);
    }

    pub fn processed_event_count(&self) -> usize {
        self.tables.lock().unwrap().processed_events.len()
    }
}

#[async_trait]
impl BillingStore for InMemoryStore {
    async fn find_admin(&self, admin_id: &str) -> StoreResult<Option<Admin>> {
        self.check("find_admin")?;
        Ok(self.admin(admin_id))
    }

    async fn find_admin_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<Admin>> {
        self.check("find_admin_by_subscription")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .admins
            .values()
            .find(|a| a.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn list_admin_ids(&self) -> StoreResult<Vec<String>> {
        self.check("list_admin_ids")?;
        let mut ids: Vec<String> = self.tables.lock().unwrap().admins.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn set_admin_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
        trial_ends_at: Option<i64>,
    ) -> StoreResult<()> {
        self.check("set_admin_subscription_status")?;
        self.update_admin(admin_id, |a| {
            a.subscription_status = Some(status.as_db().to_string());
            if trial_ends_at.is_some() {
                a.trial_ends_at = trial_ends_at;
            }
        });
        Ok(())
    }

    async fn init_admin_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<bool> {
        self.check("init_admin_subscription_status")?;
        let mut tables = self.tables.lock().unwrap();
        match tables.admins.get_mut(admin_id) {
            Some(a) if a.subscription_status.is_none() => {
                a.subscription_status = Some(status.as_db().to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_admin_customer(&self, admin_id: &str, customer_id: &str) -> StoreResult<()> {
        self.check("set_admin_customer")?;
        self.update_admin(admin_id, |a| {
            a.stripe_customer_id = Some(customer_id.to_string())
        });
        Ok(())
    }

    async fn link_admin_stripe(
        &self,
        admin_id: &str,
        customer_id: Option<&str>,
        subscription_id: Option<&str>,
    ) -> StoreResult<()> {
        self.check("link_admin_stripe")?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(a) = tables.admins.get_mut(admin_id) {
            if let Some(c) = customer_id {
                a.stripe_customer_id = Some(c.to_string());
            }
            if let Some(s) = subscription_id {
                a.stripe_subscription_id = Some(s.to_string());
            }
        }
        if let Some(sub) = tables.subscriptions.get_mut(admin_id) {
            if let Some(c) = customer_id {
                sub.stripe_customer_id = Some(c.to_string());
            }
            if let Some(s) = subscription_id {
                sub.stripe_subscription_id = Some(s.to_string());
            }
            sub.updated_at = now_millis();
        }
        Ok(())
    }

    async fn find_condominium(&self, condo_id: &str) -> StoreResult<Option<Condominium>> {
        self.check("find_condominium")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .condominiums
            .get(condo_id)
            .cloned())
    }

    async fn count_condominiums(&self, admin_id: &str) -> StoreResult<i64> {
        self.check("count_condominiums")?;
        let count = self
            .tables
            .lock()
            .unwrap()
            .condominiums
            .values()
            .filter(|c| c.admin_id == admin_id)
            .count();
        Ok(count as i64)
    }

    async fn find_supplier(&self, supplier_id: &str) -> StoreResult<Option<Supplier>> {
        self.check("find_supplier")?;
        Ok(self.supplier(supplier_id))
    }

    async fn find_supplier_by_subscription(
        &self,
        subscription_id: &str,
    ) -> StoreResult<Option<Supplier>> {
        self.check("find_supplier_by_subscription")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .suppliers
            .values()
            .find(|s| s.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn update_supplier_plan(
        &self,
        supplier_id: &str,
        update: &PlanUpdate<'_>,
    ) -> StoreResult<()> {
        self.check("update_supplier_plan")?;
        self.update_supplier(supplier_id, |s| {
            s.plan = update.plan.to_string();
            s.plan_status = update.plan_status.map(String::from);
            if let Some(id) = update.stripe_subscription_id {
                s.stripe_subscription_id = Some(id.to_string());
            }
            if let Some(id) = update.stripe_customer_id {
                s.stripe_customer_id = Some(id.to_string());
            }
            s.plan_renews_at = update.plan_renews_at;
        });
        Ok(())
    }

    async fn set_supplier_customer(
        &self,
        supplier_id: &str,
        customer_id: &str,
    ) -> StoreResult<()> {
        self.check("set_supplier_customer")?;
        self.update_supplier(supplier_id, |s| {
            s.stripe_customer_id = Some(customer_id.to_string())
        });
        Ok(())
    }

    async fn upsert_subscription(&self, sub: &Subscription) -> StoreResult<Subscription> {
        self.check("upsert_subscription")?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .subscriptions
            .entry(sub.admin_id.clone())
            .and_modify(|existing| {
                existing.base_fee_cents = sub.base_fee_cents;
                existing.per_unit_fee_cents = sub.per_unit_fee_cents;
                existing.condo_count = sub.condo_count;
                existing.total_price_cents = sub.total_price_cents;
                if sub.stripe_subscription_id.is_some() {
                    existing.stripe_subscription_id = sub.stripe_subscription_id.clone();
                }
                if sub.stripe_customer_id.is_some() {
                    existing.stripe_customer_id = sub.stripe_customer_id.clone();
                }
                if existing.status.is_none() {
                    existing.status = sub.status.clone();
                }
                existing.updated_at = sub.updated_at;
            })
            .or_insert_with(|| sub.clone());
        Ok(row.clone())
    }

    async fn find_subscription(&self, admin_id: &str) -> StoreResult<Option<Subscription>> {
        self.check("find_subscription")?;
        Ok(self.subscription(admin_id))
    }

    async fn set_subscription_status(
        &self,
        admin_id: &str,
        status: SubscriptionStatus,
    ) -> StoreResult<()> {
        self.check("set_subscription_status")?;
        if let Some(sub) = self.tables.lock().unwrap().subscriptions.get_mut(admin_id) {
            sub.status = Some(status.as_db().to_string());
            sub.updated_at = now_millis();
        }
        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<()> {
        self.check("insert_payment")?;
        let mut tables = self.tables.lock().unwrap();
        if tables.payments.contains_key(&payment.stripe_payment_id) {
            return Err(StoreError::Unavailable(format!(
                "duplicate stripe_payment_id {}",
                payment.stripe_payment_id
            )));
        }
        tables
            .payments
            .insert(payment.stripe_payment_id.clone(), payment.clone());
        Ok(())
    }

    async fn find_payment(&self, stripe_payment_id: &str) -> StoreResult<Option<Payment>> {
        self.check("find_payment")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .payments
            .get(stripe_payment_id)
            .cloned())
    }

    async fn update_payment_status(
        &self,
        stripe_payment_id: &str,
        status: PaymentStatus,
    ) -> StoreResult<u64> {
        self.check("update_payment_status")?;
        let mut tables = self.tables.lock().unwrap();
        match tables.payments.get_mut(stripe_payment_id) {
            Some(p) if p.status != PaymentStatus::Succeeded.as_db() => {
                p.status = status.as_db().to_string();
                p.updated_at = now_millis();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn update_payment_status_by_id(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> StoreResult<u64> {
        self.check("update_payment_status")?;
        let mut tables = self.tables.lock().unwrap();
        match tables.payments.values_mut().find(|p| p.id == payment_id) {
            Some(p) if p.status != PaymentStatus::Succeeded.as_db() => {
                p.status = status.as_db().to_string();
                p.updated_at = now_millis();
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn payment_totals(&self, admin_id: &str) -> StoreResult<PaymentTotals> {
        self.check("payment_totals")?;
        let tables = self.tables.lock().unwrap();
        let owned: HashSet<&str> = tables
            .condominiums
            .values()
            .filter(|c| c.admin_id == admin_id)
            .map(|c| c.id.as_str())
            .collect();
        let mut totals = PaymentTotals::default();
        for p in tables.payments.values() {
            let settled_to_admin = (p.payee_type == "admin" && p.payee_id == admin_id)
                || p.condo_id.as_deref().is_some_and(|c| owned.contains(c));
            if p.status == PaymentStatus::Succeeded.as_db() && settled_to_admin {
                totals.count += 1;
                totals.gross_cents += p.amount_cents;
                totals.platform_fee_cents += p.platform_fee_cents;
                totals.net_cents += p.net_amount_cents;
            }
        }
        Ok(totals)
    }

    async fn is_event_processed(&self, event_id: &str) -> StoreResult<bool> {
        self.check("is_event_processed")?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .processed_events
            .contains_key(event_id))
    }

    async fn mark_event_processed(&self, event_id: &str, event_type: &str) -> StoreResult<bool> {
        self.check("mark_event_processed")?;
        let mut tables = self.tables.lock().unwrap();
        if tables.processed_events.contains_key(event_id) {
            return Ok(false);
        }
        tables
            .processed_events
            .insert(event_id.to_string(), event_type.to_string());
        Ok(true)
    }
}
