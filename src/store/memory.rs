use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{MarkUsed, StoreError, TicketStore};
use crate::models::{Event, Ticket, TicketStatus};
use crate::validation::code::TicketCode;

#[derive(Default)]
struct Tables {
    tickets: HashMap<String, Ticket>,
    events: HashMap<Uuid, Event>,
}

/// In-process ticket store with the same conditional-update semantics as
/// [`super::PgTicketStore`]. Used for tests and local demos.
#[derive(Default)]
pub struct MemoryTicketStore {
    tables: Mutex<Tables>,
    offline: AtomicBool,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ticket(&self, ticket: Ticket) {
        self.lock().tickets.insert(ticket.ticket_code.clone(), ticket);
    }

    pub fn insert_event(&self, event: Event) {
        self.lock().events.insert(event.id, event);
    }

    /// Simulates losing (or regaining) the connection to the store.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn ticket(&self, code: &str) -> Option<Ticket> {
        self.lock().tickets.get(code).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock only means a test panicked mid-update.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn find_by_code(&self, code: &TicketCode) -> Result<Option<Ticket>, StoreError> {
        self.check_online()?;
        Ok(self.lock().tickets.get(code.as_str()).cloned())
    }

    async fn mark_used(&self, request: MarkUsed<'_>) -> Result<Option<Ticket>, StoreError> {
        self.check_online()?;
        let mut tables = self.lock();
        let Some(ticket) = tables.tickets.get_mut(request.code.as_str()) else {
            return Ok(None);
        };
        if !ticket.status.can_transition_to(TicketStatus::Used) {
            return Ok(None);
        }
        if request.event_id.is_some_and(|id| id != ticket.event_id) {
            return Ok(None);
        }

        ticket.status = TicketStatus::Used;
        ticket.validated_by = Some(request.validator_id);
        ticket.validated_at = Some(request.validated_at);
        ticket.updated_at = crate::models::now();
        Ok(Some(ticket.clone()))
    }

    async fn cancel(&self, code: &TicketCode) -> Result<Option<Ticket>, StoreError> {
        self.check_online()?;
        let mut tables = self.lock();
        match tables.tickets.get_mut(code.as_str()) {
            Some(ticket) if ticket.status.can_transition_to(TicketStatus::Cancelled) => {
                ticket.status = TicketStatus::Cancelled;
                ticket.updated_at = crate::models::now();
                Ok(Some(ticket.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn event_tickets(&self, event_id: Uuid) -> Result<Vec<Ticket>, StoreError> {
        self.check_online()?;
        let mut tickets: Vec<Ticket> = self
            .lock()
            .tickets
            .values()
            .filter(|t| t.event_id == event_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.created_at);
        Ok(tickets)
    }

    async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        self.check_online()?;
        Ok(self.lock().events.get(&event_id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_online()
    }
}
