//! Marketplace payment rows

use rust_decimal::Decimal;
use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Payment {
    pub id: String,
    pub payer_id: Option<String>,
    pub payee_id: String,
    pub payee_type: String,
    pub condo_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub platform_fee_percent: Decimal,
    pub platform_fee_cents: i64,
    pub stripe_fee_percent: Decimal,
    pub stripe_fee_cents: i64,
    pub net_amount_cents: i64,
    /// PaymentIntent id or Checkout Session id, depending on mode
    pub stripe_payment_id: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Aggregates over succeeded payments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct PaymentTotals {
    pub count: i64,
    pub gross_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
}

const COLUMNS: &str = "id, payer_id, payee_id, payee_type, condo_id, amount_cents, currency,
    platform_fee_percent, platform_fee_cents, stripe_fee_percent, stripe_fee_cents,
    net_amount_cents, stripe_payment_id, status, metadata, created_at, updated_at";

pub async fn insert(pool: &PgPool, p: &Payment) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO payments ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
    ))
    .bind(&p.id)
    .bind(&p.payer_id)
    .bind(&p.payee_id)
    .bind(&p.payee_type)
    .bind(&p.condo_id)
    .bind(p.amount_cents)
    .bind(&p.currency)
    .bind(p.platform_fee_percent)
    .bind(p.platform_fee_cents)
    .bind(p.stripe_fee_percent)
    .bind(p.stripe_fee_cents)
    .bind(p.net_amount_cents)
    .bind(&p.stripe_payment_id)
    .bind(&p.status)
    .bind(&p.metadata)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_by_stripe_id(
    pool: &PgPool,
    stripe_payment_id: &str,
) -> Result<Option<Payment>, sqlx::Error> {
    sqlx::query_as::<_, Payment>(&format!(
        "SELECT {COLUMNS} FROM payments WHERE stripe_payment_id = $1"
    ))
    .bind(stripe_payment_id)
    .fetch_optional(pool)
    .await
}

/// Overwrite the status unless the payment already succeeded.
/// Returns the number of rows changed.
pub async fn update_status_by_stripe_id(
    pool: &PgPool,
    stripe_payment_id: &str,
    status: &str,
    now: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET status = $1, updated_at = $2
         WHERE stripe_payment_id = $3 AND status <> 'succeeded'",
    )
    .bind(status)
    .bind(now)
    .bind(stripe_payment_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn update_status_by_id(
    pool: &PgPool,
    payment_id: &str,
    status: &str,
    now: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET status = $1, updated_at = $2
         WHERE id = $3 AND status <> 'succeeded'",
    )
    .bind(status)
    .bind(now)
    .bind(payment_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Succeeded payments settled to the admin, directly or through one of
/// their condominiums' suppliers
pub async fn totals_for_admin(pool: &PgPool, admin_id: &str) -> Result<PaymentTotals, sqlx::Error> {
    sqlx::query_as::<_, PaymentTotals>(
        "SELECT COUNT(*)::BIGINT AS count,
                COALESCE(SUM(amount_cents), 0)::BIGINT AS gross_cents,
                COALESCE(SUM(platform_fee_cents), 0)::BIGINT AS platform_fee_cents,
                COALESCE(SUM(net_amount_cents), 0)::BIGINT AS net_cents
         FROM payments
         WHERE status = 'succeeded'
           AND ((payee_type = 'admin' AND payee_id = $1)
                OR condo_id IN (SELECT id FROM condominiums WHERE admin_id = $1))",
    )
    .bind(admin_id)
    .fetch_one(pool)
    .await
}
