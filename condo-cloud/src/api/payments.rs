//! Marketplace payment endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use shared::billing::PaymentStatus;

use crate::billing::PlatformFees;
use crate::billing::payments::{CreatePaymentRequest, IssuedPayment, validate_amount};
use crate::billing::Money;
use crate::state::AppState;
use crate::store::Payment;

use super::ApiResult;

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    Json(req): Json<CreatePaymentRequest>,
) -> ApiResult<IssuedPayment> {
    let issued = state.payments.record_platform_payment(req).await?;
    Ok(Json(issued))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: PaymentStatus,
}

/// Payment row as exposed over HTTP
#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub id: String,
    pub stripe_payment_id: String,
    pub payee_id: String,
    pub payee_type: String,
    pub condo_id: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub platform_fee: Money,
    pub processor_fee: Money,
    pub net_amount: Money,
    pub status: String,
    pub updated_at: i64,
}

impl From<Payment> for PaymentView {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            stripe_payment_id: p.stripe_payment_id,
            payee_id: p.payee_id,
            payee_type: p.payee_type,
            condo_id: p.condo_id,
            amount: Money::from_cents(p.amount_cents),
            currency: p.currency,
            platform_fee: Money::from_cents(p.platform_fee_cents),
            processor_fee: Money::from_cents(p.stripe_fee_cents),
            net_amount: Money::from_cents(p.net_amount_cents),
            status: p.status,
            updated_at: p.updated_at,
        }
    }
}

/// POST /api/payments/{stripe_payment_id}/status
pub async fn update_status(
    State(state): State<AppState>,
    Path(stripe_payment_id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<PaymentView> {
    let payment = state
        .payments
        .update_payment_status(&stripe_payment_id, req.status)
        .await?;
    Ok(Json(payment.into()))
}

#[derive(Debug, Deserialize)]
pub struct FeeQuoteQuery {
    pub amount: f64,
}

/// GET /api/payments/quote?amount=X
pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<FeeQuoteQuery>,
) -> ApiResult<PlatformFees> {
    let amount = validate_amount(query.amount)?;
    Ok(Json(state.fees.calculate_platform_fees(amount)))
}
