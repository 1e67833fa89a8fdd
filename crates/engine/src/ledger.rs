//! Reminder ledger: records which `(group, offset, date)` reminders went out.
//!
//! A double-invoked scheduler run must not double-send. Before dispatching,
//! the scheduler claims the reminder; a claim that already exists means the
//! reminder was sent (or is being sent) by an earlier run.
//!
//! The Redis ledger uses `SET NX EX` for atomic check-and-set with automatic
//! TTL expiry.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use chit_common::error::AppError;

/// Default marker lifetime: two days, comfortably past the target date.
pub const DEFAULT_REMINDER_TTL_SECONDS: u64 = 172_800;

/// Identity of one reminder send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderKey {
    pub group_id: Uuid,
    pub offset: u8,
    pub date: NaiveDate,
}

impl ReminderKey {
    fn redis_key(&self) -> String {
        format!("reminder:sent:{}:{}:{}", self.group_id, self.offset, self.date)
    }
}

#[async_trait]
pub trait ReminderLedger: Send + Sync {
    /// Returns `true` if the claim is new (the reminder should be sent).
    async fn claim(&self, key: &ReminderKey) -> Result<bool, AppError>;

    /// Forget a claim so a later run can retry it.
    async fn release(&self, key: &ReminderKey) -> Result<(), AppError>;
}

/// Redis-backed ledger shared by every scheduler process.
#[derive(Clone)]
pub struct RedisReminderLedger {
    redis: ConnectionManager,
    ttl_secs: u64,
}

impl RedisReminderLedger {
    pub fn new(redis: ConnectionManager, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    /// Open a managed connection to `redis_url`.
    pub async fn connect(redis_url: &str, ttl_secs: u64) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        tracing::info!(ttl_secs, "Connected to Redis reminder ledger");
        Ok(Self::new(manager, ttl_secs))
    }
}

#[async_trait]
impl ReminderLedger for RedisReminderLedger {
    async fn claim(&self, key: &ReminderKey) -> Result<bool, AppError> {
        let mut redis = self.redis.clone();

        // SET key "1" NX EX ttl
        // Some("OK") if the key was set, None if it already existed
        let result: Option<String> = redis::cmd("SET")
            .arg(key.redis_key())
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut redis)
            .await?;

        let claimed = result.is_some();
        if !claimed {
            tracing::debug!(
                group_id = %key.group_id,
                offset = key.offset,
                date = %key.date,
                "Reminder already claimed"
            );
        }
        Ok(claimed)
    }

    async fn release(&self, key: &ReminderKey) -> Result<(), AppError> {
        let mut redis = self.redis.clone();
        redis.del::<_, ()>(key.redis_key()).await?;
        Ok(())
    }
}

/// Process-local ledger, for single-instance deployments and tests.
#[derive(Default)]
pub struct InMemoryReminderLedger {
    claimed: Mutex<HashSet<ReminderKey>>,
}

impl InMemoryReminderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &ReminderKey) -> bool {
        self.lock().contains(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<ReminderKey>> {
        self.claimed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ReminderLedger for InMemoryReminderLedger {
    async fn claim(&self, key: &ReminderKey) -> Result<bool, AppError> {
        Ok(self.lock().insert(*key))
    }

    async fn release(&self, key: &ReminderKey) -> Result<(), AppError> {
        self.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ReminderKey {
        ReminderKey {
            group_id: Uuid::parse_str("8d2f4c61-3b0f-4f7e-9a55-2f1e0c9d7a11").unwrap(),
            offset: 2,
            date: NaiveDate::from_ymd_opt(2024, 6, 12).unwrap(),
        }
    }

    #[test]
    fn test_redis_key_layout() {
        assert_eq!(
            key().redis_key(),
            "reminder:sent:8d2f4c61-3b0f-4f7e-9a55-2f1e0c9d7a11:2:2024-06-12"
        );
    }

    #[tokio::test]
    async fn test_in_memory_claim_is_exclusive_until_released() {
        let ledger = InMemoryReminderLedger::new();

        assert!(ledger.claim(&key()).await.unwrap());
        assert!(!ledger.claim(&key()).await.unwrap());
        assert!(ledger.contains(&key()));

        ledger.release(&key()).await.unwrap();
        assert!(ledger.claim(&key()).await.unwrap());
    }

    #[tokio::test]
    async fn test_distinct_offsets_are_distinct_claims() {
        let ledger = InMemoryReminderLedger::new();
        let other = ReminderKey { offset: 3, ..key() };

        assert!(ledger.claim(&key()).await.unwrap());
        assert!(ledger.claim(&other).await.unwrap());
    }
}
