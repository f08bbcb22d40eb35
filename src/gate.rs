//! Scan orchestration at the venue door.
//!
//! Scans go straight to the remote store while it is reachable. When it is
//! not, the gateway answers from local state (pending queue and ticket
//! snapshot) and queues the scan for the reconciler.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{now, NewOfflineValidation, TicketStatus};
use crate::offline::{OfflineQueue, QueueError};
use crate::store::StoreError;
use crate::sync::{Connectivity, Mode};
use crate::validation::{
    AttendanceSummary, CancelOutcome, InvalidReason, Lookup, TicketCode, TicketState,
    ValidationOutcome, ValidationRequest, Validator,
};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("remote ticket store is unreachable")]
    Offline,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflinePolicy {
    /// Refuse codes missing from the snapshot instead of queueing them.
    pub reject_unknown: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub code: String,
    pub validator_id: Uuid,
    #[serde(default)]
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub mode: Mode,
    pub admit: bool,
    #[serde(flatten)]
    pub outcome: ValidationOutcome,
}

impl ScanReport {
    fn new(mode: Mode, outcome: ValidationOutcome) -> Self {
        Self {
            mode,
            admit: outcome.admits_entry(),
            outcome,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LookupReport {
    pub mode: Mode,
    #[serde(flatten)]
    pub lookup: Lookup,
}

pub struct Gate {
    validator: Validator,
    queue: OfflineQueue,
    connectivity: Arc<Connectivity>,
    policy: OfflinePolicy,
    // Offline decisions read then write the queue; one at a time.
    offline: Mutex<()>,
}

impl Gate {
    pub fn new(
        validator: Validator,
        queue: OfflineQueue,
        connectivity: Arc<Connectivity>,
        policy: OfflinePolicy,
    ) -> Self {
        Self {
            validator,
            queue,
            connectivity,
            policy,
            offline: Mutex::new(()),
        }
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &Arc<Connectivity> {
        &self.connectivity
    }

    pub async fn scan(&self, request: ScanRequest) -> Result<ScanReport, GateError> {
        let code = match TicketCode::parse(&request.code) {
            Ok(code) => code,
            Err(e) => {
                debug!(error = %e, "Rejected malformed ticket code");
                let outcome = ValidationOutcome::malformed(&request.code);
                return Ok(ScanReport::new(self.connectivity.mode(), outcome));
            }
        };

        let validation = ValidationRequest {
            code,
            validator_id: request.validator_id,
            event_id: request.event_id,
            scanned_at: now(),
        };

        if self.connectivity.is_online() {
            // A queued admission has not reached the store yet, so the remote
            // ticket may still read as active.
            let pending = self.pending_admission(validation.code.as_str()).await?;
            if let Some(outcome) = pending {
                return Ok(ScanReport::new(Mode::Online, outcome));
            }

            match self.validator.validate(&validation).await {
                Ok(outcome) => {
                    if let ValidationOutcome::Valid { ticket } = &outcome {
                        self.refresh_snapshot(ticket.ticket_code.as_str(), &validation)
                            .await;
                    }
                    return Ok(ScanReport::new(Mode::Online, outcome));
                }
                Err(e) if e.is_unavailable() => {
                    self.connectivity.mark_offline();
                }
                Err(e) => return Err(e.into()),
            }
        }

        let outcome = self.scan_offline(validation).await?;
        Ok(ScanReport::new(Mode::Offline, outcome))
    }

    async fn scan_offline(
        &self,
        request: ValidationRequest,
    ) -> Result<ValidationOutcome, GateError> {
        let _guard = self.offline.lock().await;
        let ticket_code = request.code.to_string();

        if let Some(outcome) = self.pending_admission(&ticket_code).await? {
            return Ok(outcome);
        }

        match self.queue.snapshot_ticket(&ticket_code).await? {
            Some(snapshot) if request.event_id.is_some_and(|id| id != snapshot.event_id) => {
                return Ok(ValidationOutcome::Invalid {
                    ticket_code,
                    reason: InvalidReason::WrongEvent,
                });
            }
            Some(snapshot) => match snapshot.status {
                TicketStatus::Active => {}
                TicketStatus::Used => {
                    return Ok(ValidationOutcome::AlreadyUsed {
                        ticket_code,
                        validated_by: snapshot.validated_by,
                        validated_at: snapshot.validated_at,
                        provisional: true,
                    });
                }
                TicketStatus::Cancelled => {
                    return Ok(ValidationOutcome::Cancelled { ticket_code });
                }
                TicketStatus::Expired => return Ok(ValidationOutcome::Expired { ticket_code }),
            },
            None if self.policy.reject_unknown => {
                return Ok(ValidationOutcome::Invalid {
                    ticket_code,
                    reason: InvalidReason::NotFound,
                });
            }
            None => {}
        }

        let entry = self
            .queue
            .enqueue(NewOfflineValidation {
                ticket_code,
                validator_id: request.validator_id,
                event_id: request.event_id,
                scanned_at: request.scanned_at,
            })
            .await?;
        Ok(ValidationOutcome::Queued { entry })
    }

    /// `AlreadyUsed` when an earlier offline scan of this code is still
    /// waiting for the reconciler.
    async fn pending_admission(
        &self,
        ticket_code: &str,
    ) -> Result<Option<ValidationOutcome>, GateError> {
        let previous = self.queue.find_pending_by_code(ticket_code).await?;
        Ok(previous.map(|entry| ValidationOutcome::AlreadyUsed {
            ticket_code: ticket_code.to_string(),
            validated_by: Some(entry.validator_id),
            validated_at: Some(entry.scanned_at),
            provisional: true,
        }))
    }

    async fn refresh_snapshot(&self, ticket_code: &str, request: &ValidationRequest) {
        if let Err(e) = self
            .queue
            .mark_snapshot_used(ticket_code, request.validator_id, request.scanned_at)
            .await
        {
            warn!(error = ?e, ticket_code, "Failed to update ticket snapshot");
        }
    }

    pub async fn lookup(&self, raw: &str) -> Result<LookupReport, GateError> {
        let Ok(code) = TicketCode::parse(raw) else {
            return Ok(LookupReport {
                mode: self.connectivity.mode(),
                lookup: Lookup::of(raw.trim().to_string(), None),
            });
        };

        if self.connectivity.is_online() {
            match self.validator.lookup(&code).await {
                Ok(mut lookup) => {
                    if lookup.state == TicketState::Valid
                        && self.queue.find_pending_by_code(code.as_str()).await?.is_some()
                    {
                        lookup.state = TicketState::AlreadyUsed;
                    }
                    return Ok(LookupReport {
                        mode: Mode::Online,
                        lookup,
                    })
                }
                Err(e) if e.is_unavailable() => {
                    self.connectivity.mark_offline();
                }
                Err(e) => return Err(e.into()),
            }
        }

        let ticket_code = code.to_string();
        let state = if self.queue.find_pending_by_code(&ticket_code).await?.is_some() {
            TicketState::AlreadyUsed
        } else {
            match self.queue.snapshot_ticket(&ticket_code).await? {
                Some(snapshot) => TicketState::from(snapshot.status),
                None => TicketState::Invalid,
            }
        };

        Ok(LookupReport {
            mode: Mode::Offline,
            lookup: Lookup {
                ticket_code,
                state,
                ticket: None,
            },
        })
    }

    pub async fn cancel(&self, raw: &str) -> Result<Option<CancelOutcome>, GateError> {
        let Ok(code) = TicketCode::parse(raw) else {
            return Ok(None);
        };
        self.require_online()?;
        let outcome = self.observe(self.validator.cancel(&code).await)?;
        Ok(Some(outcome))
    }

    /// Downloads an event's tickets into the local snapshot.
    pub async fn prefetch(&self, event_id: Uuid) -> Result<usize, GateError> {
        self.require_online()?;
        let tickets = self.observe(self.validator.store().event_tickets(event_id).await)?;
        Ok(self.queue.replace_snapshot(event_id, &tickets).await?)
    }

    pub async fn attendance(
        &self,
        event_id: Uuid,
    ) -> Result<Option<AttendanceSummary>, GateError> {
        self.require_online()?;
        self.observe(self.validator.attendance(event_id).await)
    }

    fn require_online(&self) -> Result<(), GateError> {
        if self.connectivity.is_online() {
            Ok(())
        } else {
            Err(GateError::Offline)
        }
    }

    fn observe<T>(&self, result: Result<T, StoreError>) -> Result<T, GateError> {
        result.map_err(|e| {
            if e.is_unavailable() {
                self.connectivity.mark_offline();
            }
            GateError::Store(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Ticket;
    use crate::store::MemoryTicketStore;

    struct Fixture {
        store: Arc<MemoryTicketStore>,
        gate: Gate,
        event_id: Uuid,
    }

    async fn fixture(policy: OfflinePolicy) -> Fixture {
        let store = Arc::new(MemoryTicketStore::new());
        let queue = OfflineQueue::in_memory().await.unwrap();
        let gate = Gate::new(
            Validator::new(store.clone()),
            queue,
            Arc::new(Connectivity::default()),
            policy,
        );
        Fixture {
            store,
            gate,
            event_id: Uuid::new_v4(),
        }
    }

    impl Fixture {
        fn issue(&self, status: TicketStatus) -> Ticket {
            let mut ticket =
                Ticket::issue(Uuid::new_v4(), self.event_id, TicketCode::generate());
            ticket.status = status;
            self.store.insert_ticket(ticket.clone());
            ticket
        }

        fn scan(&self, code: &str) -> ScanRequest {
            ScanRequest {
                code: code.to_string(),
                validator_id: Uuid::new_v4(),
                event_id: Some(self.event_id),
            }
        }

        fn go_offline(&self) {
            self.store.set_offline(true);
        }
    }

    #[tokio::test]
    async fn test_online_scan_validates_remotely() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);

        let report = f.gate.scan(f.scan(&ticket.qr_payload)).await.unwrap();
        assert_eq!(report.mode, Mode::Online);
        assert!(report.admit);
        assert_eq!(
            f.store.ticket(&ticket.ticket_code).unwrap().status,
            TicketStatus::Used
        );

        let again = f.gate.scan(f.scan(&ticket.ticket_code)).await.unwrap();
        assert!(!again.admit);
        assert!(matches!(
            again.outcome,
            ValidationOutcome::AlreadyUsed {
                provisional: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_queued_admission_blocks_rescan_after_reconnect() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);
        f.go_offline();

        let first_request = f.scan(&ticket.ticket_code);
        let first_validator = first_request.validator_id;
        let first = f.gate.scan(first_request).await.unwrap();
        assert!(first.admit);

        // Back online, but the reconciler has not replayed the entry yet.
        f.store.set_offline(false);
        f.gate.connectivity().mark_online();

        let second = f.gate.scan(f.scan(&ticket.qr_payload)).await.unwrap();
        assert_eq!(second.mode, Mode::Online);
        assert!(!second.admit);
        match second.outcome {
            ValidationOutcome::AlreadyUsed {
                validated_by,
                provisional,
                ..
            } => {
                assert_eq!(validated_by, Some(first_validator));
                assert!(provisional);
            }
            other => panic!("expected a provisional already-used, got {other:?}"),
        }
        assert_eq!(
            f.store.ticket(&ticket.ticket_code).unwrap().status,
            TicketStatus::Active
        );
        assert_eq!(f.gate.queue().stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_malformed_code_is_invalid_not_an_error() {
        let f = fixture(OfflinePolicy::default()).await;

        let report = f.gate.scan(f.scan("<script>")).await.unwrap();
        assert!(!report.admit);
        assert!(matches!(
            report.outcome,
            ValidationOutcome::Invalid {
                reason: InvalidReason::MalformedCode,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_outage_falls_back_to_queue() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);
        f.go_offline();

        let report = f.gate.scan(f.scan(&ticket.ticket_code)).await.unwrap();
        assert_eq!(report.mode, Mode::Offline);
        assert!(report.admit);
        assert!(matches!(report.outcome, ValidationOutcome::Queued { .. }));
        assert!(!f.gate.connectivity().is_online());
        assert_eq!(
            f.store.ticket(&ticket.ticket_code).unwrap().status,
            TicketStatus::Active
        );
    }

    #[tokio::test]
    async fn test_second_offline_scan_of_same_ticket_is_refused() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);
        f.go_offline();

        let first_request = f.scan(&ticket.ticket_code);
        let first_validator = first_request.validator_id;
        f.gate.scan(first_request).await.unwrap();

        let report = f.gate.scan(f.scan(&ticket.ticket_code)).await.unwrap();
        assert!(!report.admit);
        match report.outcome {
            ValidationOutcome::AlreadyUsed {
                validated_by,
                provisional,
                ..
            } => {
                assert_eq!(validated_by, Some(first_validator));
                assert!(provisional);
            }
            other => panic!("expected already used, got {other:?}"),
        }
        assert_eq!(f.gate.queue().stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn test_concurrent_offline_scans_queue_once() {
        let f = Arc::new(fixture(OfflinePolicy::default()).await);
        let ticket = f.issue(TicketStatus::Active);
        f.go_offline();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let f = Arc::clone(&f);
            let code = ticket.ticket_code.clone();
            handles.push(tokio::spawn(async move {
                f.gate.scan(f.scan(&code)).await.unwrap().admit
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }

    #[tokio::test]
    async fn test_snapshot_prechecks_offline_scans() {
        let f = fixture(OfflinePolicy {
            reject_unknown: true,
        })
        .await;
        let used = f.issue(TicketStatus::Active);
        let cancelled = f.issue(TicketStatus::Cancelled);
        let active = f.issue(TicketStatus::Active);

        f.gate.scan(f.scan(&used.ticket_code)).await.unwrap();
        assert_eq!(f.gate.prefetch(f.event_id).await.unwrap(), 3);
        f.go_offline();

        let report = f.gate.scan(f.scan(&used.ticket_code)).await.unwrap();
        assert!(matches!(
            report.outcome,
            ValidationOutcome::AlreadyUsed {
                provisional: true,
                ..
            }
        ));

        let report = f.gate.scan(f.scan(&cancelled.ticket_code)).await.unwrap();
        assert!(matches!(report.outcome, ValidationOutcome::Cancelled { .. }));

        let mut wrong_event = f.scan(&active.ticket_code);
        wrong_event.event_id = Some(Uuid::new_v4());
        let report = f.gate.scan(wrong_event).await.unwrap();
        assert!(matches!(
            report.outcome,
            ValidationOutcome::Invalid {
                reason: InvalidReason::WrongEvent,
                ..
            }
        ));

        let report = f.gate.scan(f.scan("TKT-NOTSOLD1")).await.unwrap();
        assert!(matches!(
            report.outcome,
            ValidationOutcome::Invalid {
                reason: InvalidReason::NotFound,
                ..
            }
        ));

        let report = f.gate.scan(f.scan(&active.ticket_code)).await.unwrap();
        assert!(report.admit);
    }

    #[tokio::test]
    async fn test_online_validation_updates_snapshot() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);
        f.gate.prefetch(f.event_id).await.unwrap();

        f.gate.scan(f.scan(&ticket.ticket_code)).await.unwrap();

        let snapshot = f
            .gate
            .queue()
            .snapshot_ticket(&ticket.ticket_code)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.status, TicketStatus::Used);
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_local_state() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);

        let online = f.gate.lookup(&ticket.ticket_code).await.unwrap();
        assert_eq!(online.mode, Mode::Online);
        assert_eq!(online.lookup.state, TicketState::Valid);

        f.go_offline();
        f.gate.scan(f.scan(&ticket.ticket_code)).await.unwrap();

        let offline = f.gate.lookup(&ticket.ticket_code).await.unwrap();
        assert_eq!(offline.mode, Mode::Offline);
        assert_eq!(offline.lookup.state, TicketState::AlreadyUsed);

        // Until the entry is replayed, the remote row still reads active.
        f.store.set_offline(false);
        f.gate.connectivity().mark_online();
        let reconnected = f.gate.lookup(&ticket.ticket_code).await.unwrap();
        assert_eq!(reconnected.mode, Mode::Online);
        assert_eq!(reconnected.lookup.state, TicketState::AlreadyUsed);
    }

    #[tokio::test]
    async fn test_remote_only_operations_fail_offline() {
        let f = fixture(OfflinePolicy::default()).await;
        let ticket = f.issue(TicketStatus::Active);
        f.go_offline();

        let err = f.gate.prefetch(f.event_id).await.unwrap_err();
        assert!(matches!(err, GateError::Store(ref e) if e.is_unavailable()));

        let err = f.gate.cancel(&ticket.ticket_code).await.unwrap_err();
        assert!(matches!(err, GateError::Offline));
        assert!(matches!(
            f.gate.attendance(f.event_id).await,
            Err(GateError::Offline)
        ));
    }
}
