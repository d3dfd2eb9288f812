//! Supplier marketplace plan columns

use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Supplier {
    pub id: String,
    pub condo_id: Option<String>,
    pub email: Option<String>,
    pub plan: String,
    pub plan_status: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub plan_renews_at: Option<i64>,
}

/// Full plan state written by webhook handlers
#[derive(Debug, Clone, PartialEq)]
pub struct PlanUpdate<'a> {
    pub plan: &'a str,
    pub plan_status: Option<&'a str>,
    pub stripe_subscription_id: Option<&'a str>,
    pub stripe_customer_id: Option<&'a str>,
    pub plan_renews_at: Option<i64>,
}

const COLUMNS: &str = "id, condo_id, email, plan, plan_status, stripe_subscription_id,
    stripe_customer_id, plan_renews_at";

pub async fn find_by_id(pool: &PgPool, supplier_id: &str) -> Result<Option<Supplier>, sqlx::Error> {
    sqlx::query_as::<_, Supplier>(&format!("SELECT {COLUMNS} FROM suppliers WHERE id = $1"))
        .bind(supplier_id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_subscription(
    pool: &PgPool,
    stripe_subscription_id: &str,
) -> Result<Option<Supplier>, sqlx::Error> {
    sqlx::query_as::<_, Supplier>(&format!(
        "SELECT {COLUMNS} FROM suppliers WHERE stripe_subscription_id = $1"
    ))
    .bind(stripe_subscription_id)
    .fetch_optional(pool)
    .await
}

pub async fn update_plan(
    pool: &PgPool,
    supplier_id: &str,
    update: &PlanUpdate<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE suppliers SET
            plan = $1,
            plan_status = $2,
            stripe_subscription_id = COALESCE($3, stripe_subscription_id),
            stripe_customer_id = COALESCE($4, stripe_customer_id),
            plan_renews_at = $5
         WHERE id = $6",
    )
    .bind(update.plan)
    .bind(update.plan_status)
    .bind(update.stripe_subscription_id)
    .bind(update.stripe_customer_id)
    .bind(update.plan_renews_at)
    .bind(supplier_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_stripe_customer(
    pool: &PgPool,
    supplier_id: &str,
    customer_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE suppliers SET stripe_customer_id = $1 WHERE id = $2")
        .bind(customer_id)
        .bind(supplier_id)
        .execute(pool)
        .await?;
    Ok(())
}
