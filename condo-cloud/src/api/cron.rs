//! Scheduled subscription recalculation
//!
//! POST /api/cron/recalculate-subscriptions : bearer `CRON_SECRET`

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use futures::StreamExt;
use serde::Serialize;
use shared::error::{AppError, ErrorCode};

use crate::billing::recalculator::{RecalculateOptions, StripeSync};
use crate::error::DependencyExt;
use crate::state::AppState;

use super::ApiResult;

/// Recalculations in flight at once
const CONCURRENCY: usize = 8;

#[derive(Debug, Serialize)]
pub struct AdminFailure {
    pub admin_id: String,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct CronReport {
    pub processed: usize,
    pub stripe_synced: usize,
    pub failed: Vec<AdminFailure>,
}

pub async fn recalculate_all(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CronReport> {
    let token = headers
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::new(ErrorCode::NotAuthenticated))?;
    if !state.cron_token_matches(token) {
        return Err(AppError::new(ErrorCode::TokenInvalid));
    }

    let admin_ids = state
        .store
        .list_admin_ids()
        .await
        .dependency("list administrators")?;
    tracing::info!(count = admin_ids.len(), "Recalculating all subscriptions");

    let results: Vec<_> = futures::stream::iter(admin_ids)
        .map(|admin_id| {
            let recalculator = state.recalculator.clone();
            async move {
                let result = recalculator
                    .recalculate_admin_subscription(&admin_id, RecalculateOptions::default())
                    .await;
                (admin_id, result)
            }
        })
        .buffer_unordered(CONCURRENCY)
        .collect()
        .await;

    // One admin failing never stops the batch
    let mut report = CronReport::default();
    for (admin_id, result) in results {
        match result {
            Ok(r) => {
                report.processed += 1;
                if r.stripe_sync == StripeSync::Synced {
                    report.stripe_synced += 1;
                }
            }
            Err(e) => {
                tracing::error!(%admin_id, error = %e, "Scheduled recalculation failed");
                report.failed.push(AdminFailure {
                    admin_id,
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        processed = report.processed,
        failed = report.failed.len(),
        "Scheduled recalculation finished"
    );
    Ok(Json(report))
}
