use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::{OfflineQueue, QueueError};
use crate::models::{now, Ticket, TicketStatus};

/// Last known state of a ticket, captured while online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotTicket {
    pub ticket_code: String,
    pub ticket_id: Uuid,
    pub event_id: Uuid,
    pub status: TicketStatus,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub captured_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct SnapshotRow {
    ticket_code: String,
    ticket_id: Uuid,
    event_id: Uuid,
    status: String,
    validated_by: Option<Uuid>,
    validated_at: Option<DateTime<Utc>>,
    captured_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for SnapshotTicket {
    type Error = QueueError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| QueueError::Corrupt(format!("snapshot {}: {e}", row.ticket_code)))?;
        Ok(SnapshotTicket {
            ticket_code: row.ticket_code,
            ticket_id: row.ticket_id,
            event_id: row.event_id,
            status,
            validated_by: row.validated_by,
            validated_at: row.validated_at,
            captured_at: row.captured_at,
        })
    }
}

impl OfflineQueue {
    /// Replaces the stored snapshot of one event with `tickets`.
    pub async fn replace_snapshot(
        &self,
        event_id: Uuid,
        tickets: &[Ticket],
    ) -> Result<usize, QueueError> {
        let captured_at = now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM ticket_snapshots WHERE event_id = ?")
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        for ticket in tickets.iter().filter(|t| t.event_id == event_id) {
            sqlx::query(
                "INSERT OR REPLACE INTO ticket_snapshots \
                    (ticket_code, ticket_id, event_id, status, validated_by, validated_at, captured_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&ticket.ticket_code)
            .bind(ticket.id)
            .bind(ticket.event_id)
            .bind(ticket.status.as_str())
            .bind(ticket.validated_by)
            .bind(ticket.validated_at)
            .bind(captured_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        let count = tickets.iter().filter(|t| t.event_id == event_id).count();
        tracing::info!(%event_id, count, "Stored ticket snapshot");
        Ok(count)
    }

    pub async fn snapshot_ticket(
        &self,
        ticket_code: &str,
    ) -> Result<Option<SnapshotTicket>, QueueError> {
        sqlx::query_as::<_, SnapshotRow>(
            "SELECT ticket_code, ticket_id, event_id, status, validated_by, validated_at, captured_at \
             FROM ticket_snapshots WHERE ticket_code = ?",
        )
        .bind(ticket_code)
        .fetch_optional(&self.pool)
        .await?
        .map(SnapshotTicket::try_from)
        .transpose()
    }

    /// Keeps the snapshot in step with a validation confirmed online. No-op
    /// for tickets that were never snapshotted.
    pub async fn mark_snapshot_used(
        &self,
        ticket_code: &str,
        validated_by: Uuid,
        validated_at: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        sqlx::query(
            "UPDATE ticket_snapshots SET status = ?, validated_by = ?, validated_at = ? \
             WHERE ticket_code = ?",
        )
        .bind(TicketStatus::Used.as_str())
        .bind(validated_by)
        .bind(validated_at)
        .bind(ticket_code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
