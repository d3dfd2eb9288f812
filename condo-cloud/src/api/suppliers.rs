//! Supplier plan endpoints

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use shared::billing::SupplierPlan;

use crate::billing::checkout::CheckoutLink;
use crate::state::AppState;

use super::ApiResult;

#[derive(Debug, Deserialize)]
pub struct PlanCheckoutRequest {
    pub plan: SupplierPlan,
}

/// POST /api/suppliers/{supplier_id}/plan/checkout
pub async fn plan_checkout(
    State(state): State<AppState>,
    Path(supplier_id): Path<String>,
    Json(req): Json<PlanCheckoutRequest>,
) -> ApiResult<CheckoutLink> {
    let link = state
        .checkout
        .create_supplier_plan_checkout(&supplier_id, req.plan)
        .await?;
    Ok(Json(link))
}
