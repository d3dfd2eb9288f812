//! Administrator billing endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::billing::SubscriptionPricing;
use crate::billing::checkout::SubscriptionCheckout;
use crate::billing::overview::{BillingOverview, billing_overview};
use crate::billing::recalculator::{RecalculateOptions, Recalculation};
use crate::state::AppState;

use super::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct RecalculateRequest {
    #[serde(default)]
    pub skip_stripe: bool,
}

/// POST /api/admins/{admin_id}/subscription/recalculate
pub async fn recalculate(
    State(state): State<AppState>,
    Path(admin_id): Path<String>,
    body: Option<Json<RecalculateRequest>>,
) -> ApiResult<Recalculation> {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let result = state
        .recalculator
        .recalculate_admin_subscription(
            &admin_id,
            RecalculateOptions {
                sync_stripe: !req.skip_stripe,
            },
        )
        .await?;
    Ok(Json(result))
}

/// POST /api/admins/{admin_id}/subscription/checkout
pub async fn subscription_checkout(
    State(state): State<AppState>,
    Path(admin_id): Path<String>,
) -> ApiResult<SubscriptionCheckout> {
    let checkout = state.checkout.create_subscription_checkout(&admin_id).await?;
    Ok(Json(checkout))
}

/// GET /api/admins/{admin_id}/billing/overview
pub async fn overview(
    State(state): State<AppState>,
    Path(admin_id): Path<String>,
) -> ApiResult<BillingOverview> {
    let overview = billing_overview(state.store.as_ref(), &state.fees, &admin_id).await?;
    Ok(Json(overview))
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    #[serde(default)]
    pub condos: i64,
}

/// GET /api/billing/quote?condos=N
pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Json<SubscriptionPricing> {
    Json(state.fees.calculate_subscription_total(query.condos))
}
