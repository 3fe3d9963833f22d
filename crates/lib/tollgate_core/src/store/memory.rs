//! In-process token store.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{StoreError, TokenStore};
use crate::models::token::TokenRecord;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Uuid, TokenRecord>,
    next_id: i32,
}

/// Token store held in memory. Upserts take a single lock, so concurrent
/// writers for one user serialize and the last one wins whole.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    inner: Mutex<Inner>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_by_user_id(&self, user_id: Uuid) -> Result<TokenRecord, StoreError> {
        self.lock()
            .records
            .get(&user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("token for user {user_id}")))
    }

    async fn upsert_token(&self, user_id: Uuid, hash: &str) -> Result<i32, StoreError> {
        let now = Utc::now();
        let mut inner = self.lock();
        if let Some(record) = inner.records.get_mut(&user_id) {
            record.hash = hash.to_string();
            record.updated_at = now;
            return Ok(record.id);
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(
            user_id,
            TokenRecord {
                id,
                user_id,
                hash: hash.to_string(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(id)
    }
}
