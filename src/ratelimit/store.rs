//! Quota store contract.
//!
//! The store owns the counters; the rate limiter only reads and increments
//! them through this trait. Backends range from the in-process
//! [`MemoryStore`](super::MemoryStore) to shared stores used by several
//! processes at once, so every mutation must be atomic on the store side.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

/// Errors reported by a quota store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("quota store unavailable: {0}")]
    Unavailable(String),
    #[error("quota store operation failed: {0}")]
    Backend(String),
}

/// Outcome of a single increment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    /// Whether the increment was applied.
    pub allowed: bool,
    /// Requests still available under the cap after this call.
    pub remaining: u64,
    /// Time until the counter expires.
    pub reset_in: Duration,
}

/// One counter to increment as part of an all-or-nothing batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaHit {
    pub key: String,
    /// Lifetime of the counter once created.
    pub expiry: Duration,
    /// Highest value the counter may reach (inclusive).
    pub max_count: u64,
}

/// Trait for quota store implementations.
#[async_trait]
pub trait QuotaStore: Send + Sync + std::fmt::Debug {
    /// Atomically increment `key` by one if that keeps it at or below
    /// `max_count`. A denied call leaves the counter untouched.
    async fn increment_and_check(
        &self,
        key: &str,
        expiry: Duration,
        max_count: u64,
    ) -> Result<QuotaStatus, StoreError>;

    /// Current value of `key`, zero when absent or expired.
    async fn get(&self, key: &str) -> Result<u64, StoreError>;

    /// Undo one increment. Never takes a counter below zero.
    async fn decrement(&self, key: &str) -> Result<(), StoreError>;

    /// Current values of several keys, in order.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<u64>, StoreError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Increment every hit or none of them.
    ///
    /// The default applies hits one by one and compensates with
    /// [`decrement`](Self::decrement) when a later hit is denied. Backends
    /// that can run the whole batch as one transaction should override it;
    /// the default is not atomic against a caller dropped mid-batch.
    async fn increment_all(&self, hits: &[QuotaHit]) -> Result<Vec<QuotaStatus>, StoreError> {
        let mut statuses = Vec::with_capacity(hits.len());
        for (applied, hit) in hits.iter().enumerate() {
            let status = match self
                .increment_and_check(&hit.key, hit.expiry, hit.max_count)
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    rollback(self, &hits[..applied]).await;
                    return Err(e);
                }
            };
            statuses.push(status);
            if !status.allowed {
                rollback(self, &hits[..applied]).await;
                statuses.extend(hits[applied + 1..].iter().map(|_| QuotaStatus {
                    allowed: false,
                    remaining: 0,
                    reset_in: Duration::ZERO,
                }));
                return Ok(statuses);
            }
        }
        Ok(statuses)
    }
}

async fn rollback<S: QuotaStore + ?Sized>(store: &S, applied: &[QuotaHit]) {
    for hit in applied {
        if let Err(e) = store.decrement(&hit.key).await {
            warn!(key = %hit.key, error = %e, "Failed to roll back quota increment");
        }
    }
}
