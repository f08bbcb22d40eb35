use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::code::TicketCode;
use super::{InvalidReason, Lookup, ValidationOutcome};
use crate::models::{Event, Ticket, TicketStatus};
use crate::store::{MarkUsed, StoreError, TicketStore};

/// A conditional update that matched nothing is followed by a re-read. If the
/// re-read still shows an active ticket in scope, the update is retried.
const MAX_ATTEMPTS: usize = 2;

#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub code: TicketCode,
    pub validator_id: Uuid,
    pub event_id: Option<Uuid>,
    /// Recorded as `validated_at`. For replayed offline scans this is the
    /// original scan time, not the sync time.
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Ticket),
    NotFound,
    NotActive(Ticket),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceSummary {
    pub event: Event,
    pub total: usize,
    pub active: usize,
    pub used: usize,
    pub cancelled: usize,
    pub expired: usize,
}

/// Online validation against the remote ticket store.
#[derive(Clone)]
pub struct Validator {
    store: Arc<dyn TicketStore>,
}

impl Validator {
    pub fn new(store: Arc<dyn TicketStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub async fn lookup(&self, code: &TicketCode) -> Result<Lookup, StoreError> {
        let ticket = self.store.find_by_code(code).await?;
        Ok(Lookup::of(code.to_string(), ticket))
    }

    pub async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationOutcome, StoreError> {
        for _ in 0..MAX_ATTEMPTS {
            let marked = self
                .store
                .mark_used(MarkUsed {
                    code: &request.code,
                    validator_id: request.validator_id,
                    validated_at: request.scanned_at,
                    event_id: request.event_id,
                })
                .await?;

            if let Some(ticket) = marked {
                info!(
                    ticket_code = %request.code,
                    validator_id = %request.validator_id,
                    "Ticket validated"
                );
                return Ok(ValidationOutcome::Valid { ticket });
            }

            let current = self.store.find_by_code(&request.code).await?;
            if let Some(outcome) = classify_rejection(request, current) {
                info!(
                    ticket_code = %request.code,
                    validator_id = %request.validator_id,
                    outcome = outcome.label(),
                    "Ticket rejected"
                );
                return Ok(outcome);
            }
        }

        warn!(ticket_code = %request.code, "Ticket stayed active after conditional update");
        Err(StoreError::Corrupt(format!(
            "ticket {} is active but could not be marked used",
            request.code
        )))
    }

    pub async fn cancel(&self, code: &TicketCode) -> Result<CancelOutcome, StoreError> {
        if let Some(ticket) = self.store.cancel(code).await? {
            info!(ticket_code = %code, "Ticket cancelled");
            return Ok(CancelOutcome::Cancelled(ticket));
        }

        Ok(match self.store.find_by_code(code).await? {
            Some(ticket) => CancelOutcome::NotActive(ticket),
            None => CancelOutcome::NotFound,
        })
    }

    pub async fn attendance(
        &self,
        event_id: Uuid,
    ) -> Result<Option<AttendanceSummary>, StoreError> {
        let Some(event) = self.store.find_event(event_id).await? else {
            return Ok(None);
        };
        let tickets = self.store.event_tickets(event_id).await?;

        let count = |status: TicketStatus| tickets.iter().filter(|t| t.status == status).count();
        Ok(Some(AttendanceSummary {
            total: tickets.len(),
            active: count(TicketStatus::Active),
            used: count(TicketStatus::Used),
            cancelled: count(TicketStatus::Cancelled),
            expired: count(TicketStatus::Expired),
            event,
        }))
    }
}

/// Explains why the conditional update did not match. `None` means the
/// ticket looks active and in scope, so the update should be retried.
fn classify_rejection(
    request: &ValidationRequest,
    current: Option<Ticket>,
) -> Option<ValidationOutcome> {
    let ticket_code = request.code.to_string();
    let Some(ticket) = current else {
        return Some(ValidationOutcome::Invalid {
            ticket_code,
            reason: InvalidReason::NotFound,
        });
    };

    if request.event_id.is_some_and(|id| id != ticket.event_id) {
        return Some(ValidationOutcome::Invalid {
            ticket_code,
            reason: InvalidReason::WrongEvent,
        });
    }

    match ticket.status {
        TicketStatus::Active => None,
        TicketStatus::Used => Some(ValidationOutcome::AlreadyUsed {
            ticket_code,
            validated_by: ticket.validated_by,
            validated_at: ticket.validated_at,
            provisional: false,
        }),
        TicketStatus::Cancelled => Some(ValidationOutcome::Cancelled { ticket_code }),
        TicketStatus::Expired => Some(ValidationOutcome::Expired { ticket_code }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::now;
    use crate::store::MemoryTicketStore;

    struct Fixture {
        store: Arc<MemoryTicketStore>,
        validator: Validator,
        event_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryTicketStore::new());
        let event_id = Uuid::new_v4();
        store.insert_event(Event {
            id: event_id,
            title: "Festival de Verano".to_string(),
            venue: "Estadio Nacional".to_string(),
            starts_at: Utc::now(),
            ends_at: None,
        });
        Fixture {
            validator: Validator::new(store.clone()),
            store,
            event_id,
        }
    }

    impl Fixture {
        fn issue(&self, status: TicketStatus) -> TicketCode {
            let code = TicketCode::generate();
            let mut ticket = Ticket::issue(Uuid::new_v4(), self.event_id, code.clone());
            ticket.status = status;
            self.store.insert_ticket(ticket);
            code
        }

        fn request(&self, code: &TicketCode) -> ValidationRequest {
            ValidationRequest {
                code: code.clone(),
                validator_id: Uuid::new_v4(),
                event_id: Some(self.event_id),
                scanned_at: now(),
            }
        }
    }

    #[tokio::test]
    async fn test_first_scan_is_valid_second_is_already_used() {
        let f = fixture();
        let code = f.issue(TicketStatus::Active);
        let first = f.request(&code);

        let outcome = f.validator.validate(&first).await.unwrap();
        let ticket = match outcome {
            ValidationOutcome::Valid { ticket } => ticket,
            other => panic!("expected valid, got {other:?}"),
        };
        assert_eq!(ticket.validated_by, Some(first.validator_id));
        assert_eq!(ticket.validated_at, Some(first.scanned_at));

        let outcome = f.validator.validate(&f.request(&code)).await.unwrap();
        assert_eq!(
            outcome,
            ValidationOutcome::AlreadyUsed {
                ticket_code: code.to_string(),
                validated_by: Some(first.validator_id),
                validated_at: Some(first.scanned_at),
                provisional: false,
            }
        );
    }

    #[tokio::test]
    async fn test_rejections_are_classified() {
        let f = fixture();

        let cancelled = f.issue(TicketStatus::Cancelled);
        assert_eq!(
            f.validator.validate(&f.request(&cancelled)).await.unwrap(),
            ValidationOutcome::Cancelled {
                ticket_code: cancelled.to_string()
            }
        );

        let expired = f.issue(TicketStatus::Expired);
        assert_eq!(
            f.validator.validate(&f.request(&expired)).await.unwrap(),
            ValidationOutcome::Expired {
                ticket_code: expired.to_string()
            }
        );

        let unknown = TicketCode::generate();
        assert_eq!(
            f.validator.validate(&f.request(&unknown)).await.unwrap(),
            ValidationOutcome::Invalid {
                ticket_code: unknown.to_string(),
                reason: InvalidReason::NotFound,
            }
        );
    }

    #[tokio::test]
    async fn test_ticket_from_another_event_is_invalid_and_stays_active() {
        let f = fixture();
        let code = f.issue(TicketStatus::Active);
        let mut request = f.request(&code);
        request.event_id = Some(Uuid::new_v4());

        assert_eq!(
            f.validator.validate(&request).await.unwrap(),
            ValidationOutcome::Invalid {
                ticket_code: code.to_string(),
                reason: InvalidReason::WrongEvent,
            }
        );
        assert_eq!(
            f.store.ticket(code.as_str()).unwrap().status,
            TicketStatus::Active
        );
    }

    #[tokio::test]
    async fn test_validate_propagates_unavailable_store() {
        let f = fixture();
        let code = f.issue(TicketStatus::Active);
        f.store.set_offline(true);

        let err = f.validator.validate(&f.request(&code)).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_cancel_outcomes() {
        let f = fixture();
        let code = f.issue(TicketStatus::Active);

        assert!(matches!(
            f.validator.cancel(&code).await.unwrap(),
            CancelOutcome::Cancelled(_)
        ));
        assert!(matches!(
            f.validator.cancel(&code).await.unwrap(),
            CancelOutcome::NotActive(t) if t.status == TicketStatus::Cancelled
        ));
        assert_eq!(
            f.validator.cancel(&TicketCode::generate()).await.unwrap(),
            CancelOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_attendance_counts_by_status() {
        let f = fixture();
        f.issue(TicketStatus::Active);
        f.issue(TicketStatus::Active);
        f.issue(TicketStatus::Used);
        f.issue(TicketStatus::Cancelled);

        let summary = f.validator.attendance(f.event_id).await.unwrap().unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.active, 2);
        assert_eq!(summary.used, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.expired, 0);

        assert!(f.validator.attendance(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_reports_state() {
        let f = fixture();
        let code = f.issue(TicketStatus::Used);

        let lookup = f.validator.lookup(&code).await.unwrap();
        assert_eq!(lookup.state, crate::validation::TicketState::AlreadyUsed);
        assert!(lookup.ticket.is_some());
    }
}
