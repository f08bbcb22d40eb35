//! Access to the hosted ticket store.
//!
//! Every state change goes through a conditional update that only matches
//! rows still in `active`, so the database decides which of several
//! concurrent validators wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, Ticket};
use crate::validation::code::TicketCode;

pub mod memory;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use postgres::PgTicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached. Callers fall back to offline mode.
    #[error("ticket store unavailable: {0}")]
    Unavailable(String),

    #[error("ticket store query failed")]
    Query(#[source] sqlx::Error),

    #[error("corrupt ticket row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
            other => StoreError::Query(other),
        }
    }
}

/// Arguments of the `active -> used` transition.
#[derive(Debug, Clone)]
pub struct MarkUsed<'a> {
    pub code: &'a TicketCode,
    pub validator_id: Uuid,
    pub validated_at: DateTime<Utc>,
    /// When set, only tickets of this event match.
    pub event_id: Option<Uuid>,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_by_code(&self, code: &TicketCode) -> Result<Option<Ticket>, StoreError>;

    /// Marks the ticket used iff it is currently `active` (and in scope).
    /// Returns the updated ticket, or `None` when nothing matched.
    async fn mark_used(&self, request: MarkUsed<'_>) -> Result<Option<Ticket>, StoreError>;

    /// `active -> cancelled`; `None` when the ticket was not active.
    async fn cancel(&self, code: &TicketCode) -> Result<Option<Ticket>, StoreError>;

    async fn event_tickets(&self, event_id: Uuid) -> Result<Vec<Ticket>, StoreError>;

    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_errors_are_unavailable() {
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_unavailable());
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(StoreError::from(sqlx::Error::Io(io)).is_unavailable());
    }

    #[test]
    fn test_query_errors_are_not_unavailable() {
        assert!(!StoreError::from(sqlx::Error::RowNotFound).is_unavailable());
        assert!(!StoreError::Corrupt("bad".to_string()).is_unavailable());
    }
}
