use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{OfflineQueue, QueueError};
use crate::models::offline_validation::OfflineValidationRow;
use crate::models::{now, NewOfflineValidation, OfflineValidation, SyncResolution};

const QUEUE_COLUMNS: &str = "\
    id, local_id, ticket_code, validator_id, event_id, scanned_at, \
    synced, retry_count, failure_count, last_error, resolution, synced_at";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub accepted: u64,
    pub conflicts: u64,
    pub rejected: u64,
    pub abandoned: u64,
}

fn into_entry(row: OfflineValidationRow) -> Result<OfflineValidation, QueueError> {
    let id = row.id;
    OfflineValidation::try_from(row).map_err(|e| QueueError::Corrupt(format!("entry {id}: {e}")))
}

impl OfflineQueue {
    pub async fn enqueue(
        &self,
        entry: NewOfflineValidation,
    ) -> Result<OfflineValidation, QueueError> {
        let query = format!(
            "INSERT INTO offline_validations \
                (local_id, ticket_code, validator_id, event_id, scanned_at) \
             VALUES (?, ?, ?, ?, ?) \
             RETURNING {QUEUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OfflineValidationRow>(&query)
            .bind(Uuid::new_v4())
            .bind(&entry.ticket_code)
            .bind(entry.validator_id)
            .bind(entry.event_id)
            .bind(entry.scanned_at)
            .fetch_one(&self.pool)
            .await?;

        let queued = into_entry(row)?;
        tracing::info!(
            entry_id = queued.id,
            ticket_code = %queued.ticket_code,
            "Queued offline validation"
        );
        Ok(queued)
    }

    /// Unresolved entries, oldest first.
    pub async fn pending(&self, limit: u32) -> Result<Vec<OfflineValidation>, QueueError> {
        let query = format!(
            "SELECT {QUEUE_COLUMNS} FROM offline_validations \
             WHERE resolution IS NULL ORDER BY id LIMIT ?"
        );
        sqlx::query_as::<_, OfflineValidationRow>(&query)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(into_entry)
            .collect()
    }

    pub async fn find_pending_by_code(
        &self,
        ticket_code: &str,
    ) -> Result<Option<OfflineValidation>, QueueError> {
        let query = format!(
            "SELECT {QUEUE_COLUMNS} FROM offline_validations \
             WHERE ticket_code = ? AND resolution IS NULL ORDER BY id LIMIT 1"
        );
        sqlx::query_as::<_, OfflineValidationRow>(&query)
            .bind(ticket_code)
            .fetch_optional(&self.pool)
            .await?
            .map(into_entry)
            .transpose()
    }

    pub async fn get(&self, id: i64) -> Result<Option<OfflineValidation>, QueueError> {
        let query = format!("SELECT {QUEUE_COLUMNS} FROM offline_validations WHERE id = ?");
        sqlx::query_as::<_, OfflineValidationRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_entry)
            .transpose()
    }

    /// Records the remote store's decision for an entry.
    pub async fn mark_synced(
        &self,
        id: i64,
        resolution: SyncResolution,
    ) -> Result<(), QueueError> {
        if !resolution.is_synced() {
            return Err(QueueError::Corrupt(format!(
                "entry {id}: '{resolution}' is not a synced resolution"
            )));
        }

        sqlx::query(
            "UPDATE offline_validations \
             SET synced = 1, resolution = ?, synced_at = ?, last_error = NULL \
             WHERE id = ?",
        )
        .bind(resolution.as_str())
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records an attempt the store answered with an error. Returns the new
    /// failure count, which is what abandonment is measured against.
    pub async fn record_failure(&self, id: i64, error: &str) -> Result<u32, QueueError> {
        let failures: i64 = sqlx::query_scalar(
            "UPDATE offline_validations \
             SET retry_count = retry_count + 1, failure_count = failure_count + 1, \
                 last_error = ? \
             WHERE id = ? RETURNING failure_count",
        )
        .bind(error)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;

        u32::try_from(failures)
            .map_err(|_| QueueError::Corrupt(format!("entry {id}: failure count {failures}")))
    }

    /// Records an attempt that never reached the store. Leaves the failure
    /// count alone.
    pub async fn record_outage(&self, id: i64, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE offline_validations \
             SET retry_count = retry_count + 1, last_error = ? \
             WHERE id = ?",
        )
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn abandon(&self, id: i64, error: &str) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE offline_validations SET resolution = ?, last_error = ? WHERE id = ?",
        )
        .bind(SyncResolution::Abandoned.as_str())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let counts: Vec<(Option<String>, i64)> = sqlx::query_as(
            "SELECT resolution, COUNT(*) FROM offline_validations GROUP BY resolution",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = QueueStats::default();
        for (resolution, count) in counts {
            let count = u64::try_from(count).unwrap_or(0);
            let resolution = resolution
                .as_deref()
                .map(str::parse::<SyncResolution>)
                .transpose()
                .map_err(QueueError::Corrupt)?;
            match resolution {
                None => stats.pending = count,
                Some(SyncResolution::Accepted) => stats.accepted = count,
                Some(SyncResolution::Conflict) => stats.conflicts = count,
                Some(SyncResolution::Rejected) => stats.rejected = count,
                Some(SyncResolution::Abandoned) => stats.abandoned = count,
            }
        }
        Ok(stats)
    }

    /// Deletes synced entries settled before `before`. Abandoned entries are
    /// kept until someone looks at them.
    pub async fn purge_synced(&self, before: DateTime<Utc>) -> Result<u64, QueueError> {
        let result = sqlx::query(
            "DELETE FROM offline_validations WHERE synced = 1 AND synced_at < ?",
        )
        .bind(before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
