//! Hosted checkout for recurring plans
//!
//! Administrators subscribe with a base price plus a per-condominium price;
//! suppliers upgrade to a paid marketplace plan. Activation of either
//! happens later, in the `checkout.session.completed` webhook.

use std::sync::Arc;

use serde::Serialize;
use shared::billing::{SubscriptionStatus, SupplierPlan};
use shared::error::ErrorCode;

use crate::billing::fees::SubscriptionPricing;
use crate::billing::recalculator::{RecalculateOptions, SubscriptionRecalculator};
use crate::config::{CheckoutUrls, StripeConfig};
use crate::error::{BillingError, BillingResult, DependencyExt, Resource};
use crate::store::BillingStore;
use crate::stripe::{CheckoutKind, CheckoutParams, LineItem, PaymentProcessor};

/// Stripe price ids for recurring plans
#[derive(Debug, Clone, Default)]
pub struct PriceCatalog {
    pub base: Option<String>,
    pub condo: Option<String>,
    pub supplier_pro: Option<String>,
    pub supplier_business: Option<String>,
}

impl From<&StripeConfig> for PriceCatalog {
    fn from(c: &StripeConfig) -> Self {
        Self {
            base: c.base_price_id.clone(),
            condo: c.condo_price_id.clone(),
            supplier_pro: c.supplier_pro_price_id.clone(),
            supplier_business: c.supplier_business_price_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLink {
    pub session_id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCheckout {
    #[serde(flatten)]
    pub checkout: CheckoutLink,
    pub pricing: SubscriptionPricing,
}

pub struct CheckoutService {
    store: Arc<dyn BillingStore>,
    processor: Arc<dyn PaymentProcessor>,
    recalculator: SubscriptionRecalculator,
    prices: PriceCatalog,
    urls: CheckoutUrls,
}

impl CheckoutService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        processor: Arc<dyn PaymentProcessor>,
        recalculator: SubscriptionRecalculator,
        prices: PriceCatalog,
        urls: CheckoutUrls,
    ) -> Self {
        Self {
            store,
            processor,
            recalculator,
            prices,
            urls,
        }
    }

    pub async fn create_subscription_checkout(
        &self,
        admin_id: &str,
    ) -> BillingResult<SubscriptionCheckout> {
        let (Some(base_price), Some(condo_price)) = (&self.prices.base, &self.prices.condo) else {
            return Err(BillingError::platform_config(
                "STRIPE_BASE_PRICE_ID and STRIPE_CONDO_PRICE_ID must be configured",
            ));
        };

        let recalculation = self
            .recalculator
            .recalculate_admin_subscription(admin_id, RecalculateOptions { sync_stripe: false })
            .await?;

        let admin = self
            .store
            .find_admin(admin_id)
            .await
            .dependency("load administrator")?
            .ok_or_else(|| BillingError::not_found(Resource::Admin, admin_id))?;
        // A canceled or expired subscription may be replaced by a new checkout
        let entitled = admin
            .subscription_status
            .as_deref()
            .and_then(SubscriptionStatus::from_db)
            .is_some_and(|s| s.is_entitled());
        if admin.stripe_subscription_id.is_some() && entitled {
            return Err(BillingError::Validation {
                code: ErrorCode::AlreadyExists,
                message: format!("administrator {admin_id} already has a Stripe subscription"),
            });
        }

        let customer_id = match admin.stripe_customer_id {
            Some(id) => id,
            None => {
                let id = self
                    .processor
                    .create_customer(
                        admin.email.as_deref(),
                        &[("admin_id".to_string(), admin_id.to_string())],
                    )
                    .await
                    .dependency("create customer")?;
                self.store
                    .set_admin_customer(admin_id, &id)
                    .await
                    .dependency("store customer id")?;
                id
            }
        };

        let mut items = vec![LineItem {
            price_id: base_price.clone(),
            quantity: 1,
        }];
        if recalculation.pricing.condo_count > 0 {
            items.push(LineItem {
                price_id: condo_price.clone(),
                quantity: recalculation.pricing.condo_count,
            });
        }

        let session = self
            .processor
            .create_checkout_session(&CheckoutParams {
                kind: CheckoutKind::Subscription { items },
                customer_id: Some(customer_id),
                success_url: self.urls.success_url.clone(),
                cancel_url: self.urls.cancel_url.clone(),
                metadata: vec![("admin_id".to_string(), admin_id.to_string())],
                idempotency_key: None,
            })
            .await
            .dependency("create checkout session")?;

        tracing::info!(
            admin_id,
            session_id = %session.id,
            condo_count = recalculation.pricing.condo_count,
            "Subscription checkout created"
        );

        Ok(SubscriptionCheckout {
            checkout: CheckoutLink {
                session_id: session.id,
                url: session.url,
            },
            pricing: recalculation.pricing,
        })
    }

    pub async fn create_supplier_plan_checkout(
        &self,
        supplier_id: &str,
        plan: SupplierPlan,
    ) -> BillingResult<CheckoutLink> {
        let price_id = match plan {
            SupplierPlan::Free => {
                return Err(BillingError::Validation {
                    code: ErrorCode::InvalidPlan,
                    message: "the free plan needs no checkout".into(),
                });
            }
            SupplierPlan::Pro => self.prices.supplier_pro.as_ref(),
            SupplierPlan::Business => self.prices.supplier_business.as_ref(),
        }
        .ok_or_else(|| {
            BillingError::platform_config(format!(
                "no Stripe price configured for supplier plan {}",
                plan.as_db()
            ))
        })?;

        let supplier = self
            .store
            .find_supplier(supplier_id)
            .await
            .dependency("load supplier")?
            .ok_or_else(|| BillingError::not_found(Resource::Supplier, supplier_id))?;

        let entitled = supplier
            .plan_status
            .as_deref()
            .and_then(SubscriptionStatus::from_db)
            .is_some_and(|s| s.is_entitled());
        if supplier.plan == plan.as_db() && entitled {
            return Err(BillingError::Validation {
                code: ErrorCode::AlreadyExists,
                message: format!("supplier {supplier_id} is already on the {} plan", plan.as_db()),
            });
        }

        let customer_id = match supplier.stripe_customer_id {
            Some(id) => id,
            None => {
                let id = self
                    .processor
                    .create_customer(
                        supplier.email.as_deref(),
                        &[("supplier_id".to_string(), supplier_id.to_string())],
                    )
                    .await
                    .dependency("create customer")?;
                self.store
                    .set_supplier_customer(supplier_id, &id)
                    .await
                    .dependency("store customer id")?;
                id
            }
        };

        let session = self
            .processor
            .create_checkout_session(&CheckoutParams {
                kind: CheckoutKind::Subscription {
                    items: vec![LineItem {
                        price_id: price_id.clone(),
                        quantity: 1,
                    }],
                },
                customer_id: Some(customer_id),
                success_url: self.urls.success_url.clone(),
                cancel_url: self.urls.cancel_url.clone(),
                metadata: vec![
                    ("supplier_id".to_string(), supplier_id.to_string()),
                    ("plan".to_string(), plan.as_db().to_string()),
                ],
                idempotency_key: None,
            })
            .await
            .dependency("create checkout session")?;

        tracing::info!(supplier_id, plan = plan.as_db(), session_id = %session.id, "Supplier plan checkout created");

        Ok(CheckoutLink {
            session_id: session.id,
            url: session.url,
        })
    }
}
