//! API routes for condo-cloud

pub mod billing;
pub mod cron;
pub mod health;
pub mod payments;
pub mod suppliers;
pub mod webhook;

use axum::Router;
use axum::routing::{get, post};
use shared::error::AppError;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Administrator billing
    let admins = Router::new()
        .route(
            "/api/admins/{admin_id}/subscription/recalculate",
            post(billing::recalculate),
        )
        .route(
            "/api/admins/{admin_id}/subscription/checkout",
            post(billing::subscription_checkout),
        )
        .route(
            "/api/admins/{admin_id}/billing/overview",
            get(billing::overview),
        );

    // Marketplace payments
    let payments = Router::new()
        .route("/api/payments", post(payments::create_payment))
        .route(
            "/api/payments/{stripe_payment_id}/status",
            post(payments::update_status),
        )
        .route(
            "/api/suppliers/{supplier_id}/plan/checkout",
            post(suppliers::plan_checkout),
        );

    // Quotes never touch the store
    let quotes = Router::new()
        .route("/api/billing/quote", get(billing::quote))
        .route("/api/payments/quote", get(payments::quote));

    // Stripe webhook (signature-verified, raw body)
    let webhook = Router::new().route("/stripe/webhook", post(webhook::handle_webhook));

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/cron/recalculate-subscriptions",
            post(cron::recalculate_all),
        )
        .merge(admins)
        .merge(payments)
        .merge(quotes)
        .merge(webhook)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
