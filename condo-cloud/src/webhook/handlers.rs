//! Per-event state mutations
//!
//! Every write is absolute (a status, a plan, an id), never an increment,
//! so replays and out-of-order deliveries converge on the latest state.
//! References to unknown administrators, suppliers or payments are a no-op.

use shared::billing::{PaymentStatus, SubscriptionStatus, SupplierPlan};

use crate::error::{BillingResult, DependencyExt};
use crate::store::{Admin, BillingStore, PlanUpdate, Supplier};
use crate::stripe::events::{
    CheckoutSessionMode, CheckoutSnapshot, EventKind, PaymentIntentRef, SubscriptionSnapshot,
};

/// What a handler did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Applied,
    /// The referenced entity is not ours (or not yet known)
    NoTarget,
    Unhandled,
}

pub async fn apply(store: &dyn BillingStore, kind: &EventKind) -> BillingResult<Effect> {
    match kind {
        EventKind::SubscriptionChanged(sub) => subscription_changed(store, sub, sub.status).await,
        EventKind::SubscriptionDeleted(sub) => {
            subscription_changed(store, sub, SubscriptionStatus::Canceled).await
        }
        EventKind::PaymentSucceeded(pi) => payment_status(store, pi, PaymentStatus::Succeeded).await,
        EventKind::PaymentFailed(pi) => {
            if let Some(ref reason) = pi.failure_message {
                tracing::info!(payment_intent = %pi.id, %reason, "Payment failed");
            }
            payment_status(store, pi, PaymentStatus::Failed).await
        }
        EventKind::InvoicePaymentFailed { subscription_id } => {
            invoice_failed(store, subscription_id).await
        }
        EventKind::CheckoutCompleted(session) => checkout_completed(store, session).await,
        EventKind::Unhandled => Ok(Effect::Unhandled),
    }
}

/// Subscription owner: linked admin or linked supplier
enum Owner {
    Admin(Admin),
    Supplier(Supplier),
}

async fn find_owner(store: &dyn BillingStore, subscription_id: &str) -> BillingResult<Option<Owner>> {
    if let Some(admin) = store
        .find_admin_by_subscription(subscription_id)
        .await
        .dependency("find admin by subscription")?
    {
        return Ok(Some(Owner::Admin(admin)));
    }
    if let Some(supplier) = store
        .find_supplier_by_subscription(subscription_id)
        .await
        .dependency("find supplier by subscription")?
    {
        return Ok(Some(Owner::Supplier(supplier)));
    }
    Ok(None)
}

/// Whether an unlinked subscription may attach to an owner named in its
/// metadata. A live subscription can replace a dead one; nothing replaces
/// a live one, so late events for an old subscription stay inert.
fn may_claim(
    linked: Option<&str>,
    linked_status: Option<&str>,
    incoming_id: &str,
    incoming: SubscriptionStatus,
) -> bool {
    match linked {
        None => true,
        Some(id) if id == incoming_id => true,
        Some(_) => {
            let linked_live = linked_status
                .and_then(SubscriptionStatus::from_db)
                .is_some_and(|s| s.is_entitled());
            !linked_live && incoming.is_entitled()
        }
    }
}

/// Subscription events may arrive before checkout.session.completed linked the ids
async fn claim_from_metadata(
    store: &dyn BillingStore,
    sub: &SubscriptionSnapshot,
    status: SubscriptionStatus,
) -> BillingResult<Option<Owner>> {
    if let Some(admin_id) = sub.metadata.get("admin_id")
        && let Some(admin) = store
            .find_admin(admin_id)
            .await
            .dependency("load administrator")?
    {
        if may_claim(
            admin.stripe_subscription_id.as_deref(),
            admin.subscription_status.as_deref(),
            &sub.id,
            status,
        ) {
            return Ok(Some(Owner::Admin(admin)));
        }
        tracing::info!(
            %admin_id,
            subscription_id = %sub.id,
            linked = ?admin.stripe_subscription_id,
            "Administrator holds another subscription, ignoring event"
        );
        return Ok(None);
    }
    if let Some(supplier_id) = sub.metadata.get("supplier_id")
        && let Some(supplier) = store
            .find_supplier(supplier_id)
            .await
            .dependency("load supplier")?
    {
        if may_claim(
            supplier.stripe_subscription_id.as_deref(),
            supplier.plan_status.as_deref(),
            &sub.id,
            status,
        ) {
            return Ok(Some(Owner::Supplier(supplier)));
        }
        tracing::info!(
            %supplier_id,
            subscription_id = %sub.id,
            linked = ?supplier.stripe_subscription_id,
            "Supplier holds another subscription, ignoring event"
        );
    }
    Ok(None)
}

async fn subscription_changed(
    store: &dyn BillingStore,
    sub: &SubscriptionSnapshot,
    status: SubscriptionStatus,
) -> BillingResult<Effect> {
    let owner = match find_owner(store, &sub.id).await? {
        Some(owner) => Some(owner),
        None => claim_from_metadata(store, sub, status).await?,
    };
    match owner {
        Some(Owner::Admin(admin)) => {
            if admin.stripe_subscription_id.as_deref() != Some(sub.id.as_str()) {
                store
                    .link_admin_stripe(&admin.id, sub.customer_id.as_deref(), Some(&sub.id))
                    .await
                    .dependency("link admin subscription")?;
            }
            store
                .set_admin_subscription_status(&admin.id, status, sub.trial_end)
                .await
                .dependency("update admin subscription status")?;
            store
                .set_subscription_status(&admin.id, status)
                .await
                .dependency("update subscription status")?;
            tracing::info!(admin_id = %admin.id, subscription_id = %sub.id, status = status.as_db(), "Admin subscription status updated");
            Ok(Effect::Applied)
        }
        Some(Owner::Supplier(supplier)) => {
            let canceled = status == SubscriptionStatus::Canceled;
            let plan = if canceled {
                SupplierPlan::Free.as_db()
            } else {
                plan_from_metadata(sub).unwrap_or(supplier.plan.as_str())
            };
            store
                .update_supplier_plan(
                    &supplier.id,
                    &PlanUpdate {
                        plan,
                        plan_status: Some(status.as_db()),
                        stripe_subscription_id: Some(&sub.id),
                        stripe_customer_id: sub.customer_id.as_deref(),
                        plan_renews_at: if canceled { None } else { sub.current_period_end },
                    },
                )
                .await
                .dependency("update supplier plan")?;
            tracing::info!(supplier_id = %supplier.id, plan, status = status.as_db(), "Supplier plan updated");
            Ok(Effect::Applied)
        }
        None => {
            tracing::info!(subscription_id = %sub.id, "Subscription event for unknown owner, ignoring");
            Ok(Effect::NoTarget)
        }
    }
}

fn plan_from_metadata(sub: &SubscriptionSnapshot) -> Option<&'static str> {
    sub.metadata
        .get("plan")
        .and_then(|p| SupplierPlan::from_db(p))
        .map(|p| p.as_db())
}

async fn payment_status(
    store: &dyn BillingStore,
    pi: &PaymentIntentRef,
    status: PaymentStatus,
) -> BillingResult<Effect> {
    let mut changed = store
        .update_payment_status(&pi.id, status)
        .await
        .dependency("update payment status")?;

    // Checkout-created intents are stored under the session id
    if changed == 0
        && let Some(ref record_id) = pi.payment_record_id
    {
        changed = store
            .update_payment_status_by_id(record_id, status)
            .await
            .dependency("update payment status")?;
    }

    if changed == 0 {
        tracing::info!(payment_intent = %pi.id, status = status.as_db(), "No payment to update");
        return Ok(Effect::NoTarget);
    }
    tracing::info!(payment_intent = %pi.id, status = status.as_db(), "Payment status updated");
    Ok(Effect::Applied)
}

async fn invoice_failed(store: &dyn BillingStore, subscription_id: &str) -> BillingResult<Effect> {
    let status = SubscriptionStatus::PastDue;
    match find_owner(store, subscription_id).await? {
        Some(Owner::Admin(admin)) => {
            store
                .set_admin_subscription_status(&admin.id, status, None)
                .await
                .dependency("update admin subscription status")?;
            store
                .set_subscription_status(&admin.id, status)
                .await
                .dependency("update subscription status")?;
            tracing::warn!(admin_id = %admin.id, subscription_id, "Subscription invoice failed, past due");
            Ok(Effect::Applied)
        }
        Some(Owner::Supplier(supplier)) => {
            store
                .update_supplier_plan(
                    &supplier.id,
                    &PlanUpdate {
                        plan: &supplier.plan,
                        plan_status: Some(status.as_db()),
                        stripe_subscription_id: None,
                        stripe_customer_id: None,
                        plan_renews_at: supplier.plan_renews_at,
                    },
                )
                .await
                .dependency("update supplier plan")?;
            tracing::warn!(supplier_id = %supplier.id, subscription_id, "Supplier invoice failed, past due");
            Ok(Effect::Applied)
        }
        None => Ok(Effect::NoTarget),
    }
}

async fn checkout_completed(
    store: &dyn BillingStore,
    session: &CheckoutSnapshot,
) -> BillingResult<Effect> {
    match session.mode {
        CheckoutSessionMode::Payment => {
            let status = match session.payment_status.as_deref() {
                Some("paid") | Some("no_payment_required") => PaymentStatus::Succeeded,
                _ => PaymentStatus::Processing,
            };
            let changed = store
                .update_payment_status(&session.session_id, status)
                .await
                .dependency("update payment status")?;
            if changed == 0 {
                return Ok(Effect::NoTarget);
            }
            tracing::info!(session_id = %session.session_id, status = status.as_db(), "Checkout payment updated");
            Ok(Effect::Applied)
        }
        CheckoutSessionMode::Subscription => {
            if let Some(admin_id) = session.metadata.get("admin_id") {
                if store
                    .find_admin(admin_id)
                    .await
                    .dependency("load administrator")?
                    .is_none()
                {
                    return Ok(Effect::NoTarget);
                }
                store
                    .link_admin_stripe(
                        admin_id,
                        session.customer_id.as_deref(),
                        session.subscription_id.as_deref(),
                    )
                    .await
                    .dependency("link admin subscription")?;
                tracing::info!(%admin_id, subscription_id = ?session.subscription_id, "Admin subscription linked");
                return Ok(Effect::Applied);
            }

            if let Some(supplier_id) = session.metadata.get("supplier_id") {
                let Some(plan) = session
                    .metadata
                    .get("plan")
                    .and_then(|p| SupplierPlan::from_db(p))
                else {
                    tracing::warn!(%supplier_id, "Supplier checkout without a valid plan");
                    return Ok(Effect::NoTarget);
                };
                let Some(supplier) = store
                    .find_supplier(supplier_id)
                    .await
                    .dependency("load supplier")?
                else {
                    return Ok(Effect::NoTarget);
                };
                store
                    .update_supplier_plan(
                        supplier_id,
                        &PlanUpdate {
                            plan: plan.as_db(),
                            plan_status: Some(SubscriptionStatus::Active.as_db()),
                            stripe_subscription_id: session.subscription_id.as_deref(),
                            stripe_customer_id: session.customer_id.as_deref(),
                            plan_renews_at: supplier.plan_renews_at,
                        },
                    )
                    .await
                    .dependency("update supplier plan")?;
                tracing::info!(%supplier_id, plan = plan.as_db(), "Supplier plan activated");
                return Ok(Effect::Applied);
            }

            Ok(Effect::NoTarget)
        }
        CheckoutSessionMode::Setup => Ok(Effect::Unhandled),
    }
}
