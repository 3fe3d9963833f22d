//! PostgreSQL token store on top of the cluster router.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{StoreError, TokenStore};
use crate::cluster::ClusterRouter;
use crate::cluster::pg::PgNode;
use crate::models::token::TokenRecord;

/// Default per-query deadline.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Token store backed by a PostgreSQL cluster.
///
/// Reads go to a standby-preferred node, writes to the primary. A read that
/// lands on a lagging standby sees the previous hash until replication
/// catches up. In that window the newest refresh token is rejected, and the
/// token it replaced still verifies and can be rotated a second time.
pub struct PgTokenStore {
    router: Arc<ClusterRouter<PgNode>>,
    query_timeout: Duration,
}

impl PgTokenStore {
    pub fn new(router: Arc<ClusterRouter<PgNode>>) -> Self {
        Self {
            router,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Override the per-query deadline.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<TokenRecord, StoreError> {
        let node = self.router.standby_preferred()?;

        let row = with_deadline(
            "get token by user_id",
            self.query_timeout,
            sqlx::query_as::<_, (i32, Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
                "SELECT id, user_id, hash, created_at, updated_at FROM token WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(node.pool()),
        )
        .await?;

        row.map(|(id, user_id, hash, created_at, updated_at)| TokenRecord {
            id,
            user_id,
            hash,
            created_at,
            updated_at,
        })
        .ok_or_else(|| StoreError::NotFound(format!("token for user {user_id}")))
    }

    async fn upsert_token(&self, user_id: Uuid, hash: &str) -> Result<i32, StoreError> {
        let node = self.router.primary()?;

        with_deadline(
            "upsert token",
            self.query_timeout,
            sqlx::query_scalar::<_, i32>(
                "INSERT INTO token (user_id, hash) VALUES ($1, $2) \
                 ON CONFLICT (user_id) DO UPDATE \
                 SET hash = EXCLUDED.hash, updated_at = now() \
                 RETURNING id",
            )
            .bind(user_id)
            .bind(hash)
            .fetch_one(node.pool()),
        )
        .await
    }
}

/// Run a query under a deadline. On expiry the query future is dropped,
/// which hands its connection back to the pool.
async fn with_deadline<T>(
    op: &'static str,
    after: Duration,
    query: impl Future<Output = Result<T, sqlx::Error>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(after, query).await {
        Ok(result) => result.map_err(|source| StoreError::Query { op, source }),
        Err(_) => Err(StoreError::Timeout { op, after }),
    }
}
