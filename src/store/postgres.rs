use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{MarkUsed, StoreError, TicketStore};
use crate::models::{Event, Ticket, TicketRow};
use crate::validation::code::TicketCode;

/// Column list for `tickets` queries.
const TICKET_COLUMNS: &str = "\
    id, purchase_id, event_id, ticket_code, qr_payload, status, \
    validated_by, validated_at, created_at, updated_at";

/// PostgreSQL-backed ticket store.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_ticket(row: TicketRow) -> Result<Ticket, StoreError> {
    let code = row.ticket_code.clone();
    Ticket::try_from(row).map_err(|e| StoreError::Corrupt(format!("ticket {code}: {e}")))
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn find_by_code(&self, code: &TicketCode) -> Result<Option<Ticket>, StoreError> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_code = $1");
        sqlx::query_as::<_, TicketRow>(&query)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(into_ticket)
            .transpose()
    }

    async fn mark_used(&self, request: MarkUsed<'_>) -> Result<Option<Ticket>, StoreError> {
        // Concurrent updates on the same row serialize on the row lock; the
        // loser re-evaluates the WHERE clause and matches nothing.
        let query = format!(
            "UPDATE tickets \
             SET status = 'used', validated_by = $2, validated_at = $3, updated_at = now() \
             WHERE ticket_code = $1 AND status = 'active' \
               AND ($4::uuid IS NULL OR event_id = $4) \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, TicketRow>(&query)
            .bind(request.code.as_str())
            .bind(request.validator_id)
            .bind(request.validated_at)
            .bind(request.event_id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_ticket)
            .transpose()
    }

    async fn cancel(&self, code: &TicketCode) -> Result<Option<Ticket>, StoreError> {
        let query = format!(
            "UPDATE tickets SET status = 'cancelled', updated_at = now() \
             WHERE ticket_code = $1 AND status = 'active' \
             RETURNING {TICKET_COLUMNS}"
        );
        sqlx::query_as::<_, TicketRow>(&query)
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(into_ticket)
            .transpose()
    }

    async fn event_tickets(&self, event_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        let query = format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE event_id = $1 ORDER BY created_at"
        );
        sqlx::query_as::<_, TicketRow>(&query)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(into_ticket)
            .collect()
    }

    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, title, venue, starts_at, ends_at FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(event)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
