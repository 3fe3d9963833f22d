//! PostgreSQL cluster nodes.
//!
//! Each configured host gets its own lazily-connecting pool. Role is read
//! with `pg_is_in_recovery()`: a server in recovery is a standby.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use tracing::debug;

use super::{ClusterError, DbNode, NodeRole};
use crate::config::FieldError;

/// Pool size used when `max_conn` is not configured.
pub const DEFAULT_MAX_CONN: u32 = 10;

/// Maximum time a caller waits for a pooled connection.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgreSQL cluster settings (`pg` section of the config file).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PgClusterConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub ssl_mode: Option<String>,
    #[serde(default)]
    pub max_conn: Option<u32>,
}

impl PgClusterConfig {
    /// Check required fields.
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.hosts.is_empty() {
            return Err(FieldError::Missing("hosts"));
        }
        if self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(FieldError::invalid("hosts", "must not contain empty entries"));
        }
        if self.port == 0 {
            return Err(FieldError::Missing("port"));
        }
        if self.user.is_empty() {
            return Err(FieldError::Missing("user"));
        }
        if self.password.is_empty() {
            return Err(FieldError::Missing("password"));
        }
        if self.db_name.is_empty() {
            return Err(FieldError::Missing("db_name"));
        }
        if self.max_conn == Some(0) {
            return Err(FieldError::invalid("max_conn", "must be positive"));
        }
        self.ssl_mode()?;
        Ok(())
    }

    fn ssl_mode(&self) -> Result<Option<PgSslMode>, FieldError> {
        self.ssl_mode
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(|m| {
                PgSslMode::from_str(m)
                    .map_err(|_| FieldError::invalid("ssl_mode", format!("has unknown value {m:?}")))
            })
            .transpose()
    }

    /// Connection options for every configured host, keyed by host.
    pub fn connect_options(&self) -> Result<Vec<(String, PgConnectOptions)>, FieldError> {
        let ssl_mode = self.ssl_mode()?;
        Ok(self
            .hosts
            .iter()
            .map(|host| {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(self.port)
                    .username(&self.user)
                    .password(&self.password)
                    .database(&self.db_name);
                if let Some(mode) = ssl_mode {
                    options = options.ssl_mode(mode);
                }
                (host.clone(), options)
            })
            .collect())
    }

    /// Build one node per host. Pools connect lazily, so unreachable hosts
    /// only show up as failed probes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn nodes(&self) -> Result<Vec<PgNode>, FieldError> {
        let max_conn = self.max_conn.unwrap_or(DEFAULT_MAX_CONN);
        Ok(self
            .connect_options()?
            .into_iter()
            .map(|(host, options)| {
                let pool = PgPoolOptions::new()
                    .max_connections(max_conn)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect_lazy_with(options);
                PgNode::new(format!("{host}:{}", self.port), pool)
            })
            .collect())
    }
}

/// One PostgreSQL server in the cluster.
#[derive(Debug, Clone)]
pub struct PgNode {
    address: String,
    pool: PgPool,
}

impl PgNode {
    pub fn new(address: impl Into<String>, pool: PgPool) -> Self {
        Self {
            address: address.into(),
            pool,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DbNode for PgNode {
    fn address(&self) -> &str {
        &self.address
    }

    async fn check_role(&self) -> Result<NodeRole, ClusterError> {
        let in_recovery = sqlx::query_scalar::<_, bool>("SELECT pg_is_in_recovery()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| ClusterError::Probe {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;
        Ok(if in_recovery {
            NodeRole::Standby
        } else {
            NodeRole::Primary
        })
    }

    async fn close(&self) {
        debug!(address = %self.address, "closing connection pool");
        self.pool.close().await;
    }
}
