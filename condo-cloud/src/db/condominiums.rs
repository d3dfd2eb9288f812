use sqlx::PgPool;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Condominium {
    pub id: String,
    pub admin_id: String,
}

pub async fn find_by_id(
    pool: &PgPool,
    condo_id: &str,
) -> Result<Option<Condominium>, sqlx::Error> {
    sqlx::query_as::<_, Condominium>("SELECT id, admin_id FROM condominiums WHERE id = $1")
        .bind(condo_id)
        .fetch_optional(pool)
        .await
}

/// Exact count, never an estimate
pub async fn count_by_admin(pool: &PgPool, admin_id: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM condominiums WHERE admin_id = $1")
        .bind(admin_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
