//! Read-only billing overview for the administrator dashboard
//!
//! Never writes. When the store cannot answer, the overview still renders
//! with zeroed figures and `degraded = true`.

use serde::Serialize;

use crate::billing::fees::{FeeSchedule, Money, SubscriptionPricing};
use crate::error::{BillingError, BillingResult, Resource};
use crate::store::{BillingStore, PaymentTotals};

const ZERO_PRICING: SubscriptionPricing = SubscriptionPricing {
    base: Money::ZERO,
    per_condo: Money::ZERO,
    condo_count: 0,
    total: Money::ZERO,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub count: i64,
    pub gross: Money,
    pub platform_fees: Money,
    pub net: Money,
}

impl From<PaymentTotals> for PaymentSummary {
    fn from(t: PaymentTotals) -> Self {
        Self {
            count: t.count,
            gross: Money::from_cents(t.gross_cents),
            platform_fees: Money::from_cents(t.platform_fee_cents),
            net: Money::from_cents(t.net_cents),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BillingOverview {
    pub admin_id: String,
    pub pricing: SubscriptionPricing,
    pub subscription_status: Option<String>,
    pub trial_ends_at: Option<i64>,
    pub stripe_linked: bool,
    pub payments_connected: bool,
    pub payments: PaymentSummary,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl BillingOverview {
    fn degraded(admin_id: &str, reason: String) -> Self {
        Self {
            admin_id: admin_id.to_string(),
            pricing: ZERO_PRICING,
            subscription_status: None,
            trial_ends_at: None,
            stripe_linked: false,
            payments_connected: false,
            payments: PaymentSummary::default(),
            degraded: true,
            degraded_reason: Some(reason),
        }
    }
}

pub async fn billing_overview(
    store: &dyn BillingStore,
    fees: &FeeSchedule,
    admin_id: &str,
) -> BillingResult<BillingOverview> {
    let admin = match store.find_admin(admin_id).await {
        Ok(Some(admin)) => admin,
        Ok(None) => return Err(BillingError::not_found(Resource::Admin, admin_id)),
        Err(e) => {
            tracing::warn!(admin_id, "Billing overview degraded: {e}");
            return Ok(BillingOverview::degraded(admin_id, e.to_string()));
        }
    };

    let (count, totals) = tokio::join!(
        store.count_condominiums(admin_id),
        store.payment_totals(admin_id)
    );
    let (count, totals) = match (count, totals) {
        (Ok(c), Ok(t)) => (c, t),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(admin_id, "Billing overview degraded: {e}");
            return Ok(BillingOverview::degraded(admin_id, e.to_string()));
        }
    };

    Ok(BillingOverview {
        admin_id: admin.id,
        pricing: fees.calculate_subscription_total(count),
        subscription_status: admin.subscription_status,
        trial_ends_at: admin.trial_ends_at,
        stripe_linked: admin.stripe_subscription_id.is_some(),
        payments_connected: admin.stripe_account_id.is_some_and(|a| !a.is_empty()),
        payments: totals.into(),
        degraded: false,
        degraded_reason: None,
    })
}
