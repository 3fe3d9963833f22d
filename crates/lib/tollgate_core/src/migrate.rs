//! Database migration support.
//!
//! Embeds and runs SQL migrations from `tollgate_core/migrations/`.

use sqlx::PgPool;

/// Run all embedded database migrations against the given pool.
///
/// Must be pointed at the primary; standbys reject DDL.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
