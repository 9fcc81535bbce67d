//! Durable queue interface and its SQLite implementation.

use crate::OutboxResult;
use async_trait::async_trait;
use tracing::debug;
use waypost_database::{AsyncDatabase, LocationFix, StoredFix};

/// Ordered, append-only store of fixes awaiting delivery.
///
/// Implementations must return records in insertion order and make an
/// inserted record visible to `select_oldest` once `insert` has returned.
#[async_trait]
pub trait FixQueue: Send + Sync {
    /// Append a fix and return its sequence id.
    async fn insert(&self, fix: &LocationFix) -> OutboxResult<i64>;

    /// The oldest record, without removing it.
    async fn select_oldest(&self) -> OutboxResult<Option<StoredFix>>;

    /// Remove a record. Removing an id that is already gone succeeds.
    async fn delete_by_id(&self, id: i64) -> OutboxResult<()>;
}

/// [`FixQueue`] backed by the `location_fix_outbox` table.
#[derive(Clone)]
pub struct SqliteFixQueue {
    db: AsyncDatabase,
}

impl SqliteFixQueue {
    pub fn new(db: AsyncDatabase) -> Self {
        Self { db }
    }

    /// Number of records still waiting.
    pub async fn pending_count(&self) -> OutboxResult<i64> {
        Ok(self.db.count_fixes().await?)
    }
}

#[async_trait]
impl FixQueue for SqliteFixQueue {
    async fn insert(&self, fix: &LocationFix) -> OutboxResult<i64> {
        let id = self.db.insert_fix(fix.clone()).await?;
        debug!(fix_id = id, device_id = %fix.device_id, "Fix appended to outbox");
        Ok(id)
    }

    async fn select_oldest(&self) -> OutboxResult<Option<StoredFix>> {
        Ok(self.db.select_oldest_fix().await?)
    }

    async fn delete_by_id(&self, id: i64) -> OutboxResult<()> {
        if !self.db.delete_fix(id).await? {
            debug!(fix_id = id, "Fix already removed from outbox");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OutboxError;
    use chrono::{DateTime, Utc};

    fn fix(latitude: f64) -> LocationFix {
        LocationFix {
            device_id: "device-1".to_string(),
            captured_at: DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
            latitude,
            longitude: -0.1276,
            accuracy: 3.0,
            battery: 64.0,
            charging: true,
            mock: false,
        }
    }

    async fn create_queue() -> SqliteFixQueue {
        SqliteFixQueue::new(AsyncDatabase::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let queue = create_queue().await;
        let first = queue.insert(&fix(51.0)).await.unwrap();
        let second = queue.insert(&fix(52.0)).await.unwrap();

        let head = queue.select_oldest().await.unwrap().unwrap();
        assert_eq!(head.id, first);
        assert_eq!(head.fix, fix(51.0));

        queue.delete_by_id(first).await.unwrap();
        let head = queue.select_oldest().await.unwrap().unwrap();
        assert_eq!(head.id, second);
        assert_eq!(queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_select_oldest_twice_returns_same_record() {
        let queue = create_queue().await;
        queue.insert(&fix(51.0)).await.unwrap();

        let a = queue.select_oldest().await.unwrap();
        let b = queue.select_oldest().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_delete_missing_id_succeeds() {
        let queue = create_queue().await;
        assert!(queue.delete_by_id(42).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_fix_is_rejected() {
        let queue = create_queue().await;
        let result = queue.insert(&fix(f64::NAN)).await;

        assert!(matches!(result, Err(OutboxError::Database(_))));
        assert!(queue.select_oldest().await.unwrap().is_none());
    }
}
