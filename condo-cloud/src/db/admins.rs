//! Administrator billing columns

use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Admin {
    pub id: String,
    pub email: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Stripe Connect account receiving marketplace payouts
    pub stripe_account_id: Option<String>,
    pub subscription_status: Option<String>,
    pub trial_ends_at: Option<i64>,
}

const COLUMNS: &str = "id, email, stripe_customer_id, stripe_subscription_id, stripe_account_id,
    subscription_status, trial_ends_at";

pub async fn find_by_id(pool: &PgPool, admin_id: &str) -> Result<Option<Admin>, sqlx::Error> {
    sqlx::query_as::<_, Admin>(&format!("SELECT {COLUMNS} FROM admins WHERE id = $1"))
        .bind(admin_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_subscription(
    pool: &PgPool,
    stripe_subscription_id: &str,
) -> Result<Option<Admin>, sqlx::Error> {
    sqlx::query_as::<_, Admin>(&format!(
        "SELECT {COLUMNS} FROM admins WHERE stripe_subscription_id = $1"
    ))
    .bind(stripe_subscription_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_ids(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM admins ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Absolute write of the Stripe-observed status
pub async fn update_subscription_status(
    pool: &PgPool,
    admin_id: &str,
    status: &str,
    trial_ends_at: Option<i64>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE admins SET subscription_status = $1,
            trial_ends_at = COALESCE($2, trial_ends_at)
         WHERE id = $3",
    )
    .bind(status)
    .bind(trial_ends_at)
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Set the status only if it has never been set. Returns true when written.
pub async fn init_subscription_status(
    pool: &PgPool,
    admin_id: &str,
    status: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE admins SET subscription_status = $1
         WHERE id = $2 AND subscription_status IS NULL",
    )
    .bind(status)
    .bind(admin_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_stripe_customer(
    pool: &PgPool,
    admin_id: &str,
    customer_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE admins SET stripe_customer_id = $1 WHERE id = $2")
        .bind(customer_id)
        .bind(admin_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Link Stripe ids after checkout on the admin and its subscription row
/// together; absent values keep the stored ones
pub async fn link_stripe(
    pool: &PgPool,
    admin_id: &str,
    customer_id: Option<&str>,
    subscription_id: Option<&str>,
    now: i64,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "UPDATE admins SET
            stripe_customer_id = COALESCE($1, stripe_customer_id),
            stripe_subscription_id = COALESCE($2, stripe_subscription_id)
         WHERE id = $3",
    )
    .bind(customer_id)
    .bind(subscription_id)
    .bind(admin_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE subscriptions SET
            stripe_customer_id = COALESCE($1, stripe_customer_id),
            stripe_subscription_id = COALESCE($2, stripe_subscription_id),
            updated_at = $3
         WHERE admin_id = $4",
    )
    .bind(customer_id)
    .bind(subscription_id)
    .bind(now)
    .bind(admin_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
