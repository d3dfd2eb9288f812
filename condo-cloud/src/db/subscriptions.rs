use sqlx::PgPool;

/// One row per administrator, keyed by `admin_id`
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Subscription {
    pub admin_id: String,
    pub base_fee_cents: i64,
    pub per_unit_fee_cents: i64,
    pub condo_count: i64,
    pub total_price_cents: i64,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub status: Option<String>,
    pub updated_at: i64,
}

const COLUMNS: &str = "admin_id, base_fee_cents, per_unit_fee_cents, condo_count,
    total_price_cents, stripe_subscription_id, stripe_customer_id, status, updated_at";

/// Insert or update the pricing columns. Stripe ids are only filled in,
/// never cleared, and the status column is left to webhook handlers.
pub async fn upsert(pool: &PgPool, sub: &Subscription) -> Result<Subscription, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(&format!(
        "INSERT INTO subscriptions ({COLUMNS})
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (admin_id) DO UPDATE SET
            base_fee_cents = EXCLUDED.base_fee_cents,
            per_unit_fee_cents = EXCLUDED.per_unit_fee_cents,
            condo_count = EXCLUDED.condo_count,
            total_price_cents = EXCLUDED.total_price_cents,
            stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, subscriptions.stripe_subscription_id),
            stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
            status = COALESCE(subscriptions.status, EXCLUDED.status),
            updated_at = EXCLUDED.updated_at
         RETURNING {COLUMNS}"
    ))
    .bind(&sub.admin_id)
    .bind(sub.base_fee_cents)
    .bind(sub.per_unit_fee_cents)
    .bind(sub.condo_count)
    .bind(sub.total_price_cents)
    .bind(&sub.stripe_subscription_id)
    .bind(&sub.stripe_customer_id)
    .bind(&sub.status)
    .bind(sub.updated_at)
    .fetch_one(pool)
    .await
}

pub async fn find_by_admin(
    pool: &PgPool,
    admin_id: &str,
) -> Result<Option<Subscription>, sqlx::Error> {
    sqlx::query_as::<_, Subscription>(&format!(
        "SELECT {COLUMNS} FROM subscriptions WHERE admin_id = $1"
    ))
    .bind(admin_id)
    .fetch_optional(pool)
    .await
}

pub async fn update_status(
    pool: &PgPool,
    admin_id: &str,
    status: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE subscriptions SET status = $1, updated_at = $2 WHERE admin_id = $3")
        .bind(status)
        .bind(now)
        .bind(admin_id)
        .execute(pool)
        .await?;
    Ok(())
}
