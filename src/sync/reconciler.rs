use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use super::connectivity::Connectivity;
use crate::models::{OfflineValidation, SyncResolution};
use crate::offline::{OfflineQueue, QueueError};
use crate::validation::{TicketCode, ValidationOutcome, ValidationRequest, Validator};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
    pub batch_size: u32,
    /// Store errors tolerated per entry before it is abandoned. Outages
    /// never count.
    pub max_retries: u32,
    /// Synced entries older than this are purged after each pass.
    pub retention: chrono::Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            batch_size: 50,
            max_retries: 5,
            retention: chrono::Duration::hours(72),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub accepted: u32,
    pub conflicts: u32,
    pub rejected: u32,
    /// Attempts that failed and will be retried.
    pub failed: u32,
    pub abandoned: u32,
    /// The pass stopped early because the remote store became unreachable.
    pub interrupted: bool,
}

impl SyncReport {
    pub fn processed(&self) -> u32 {
        self.accepted + self.conflicts + self.rejected + self.failed + self.abandoned
    }
}

/// Replays queued offline validations against the remote store.
pub struct SyncReconciler {
    validator: Validator,
    queue: OfflineQueue,
    connectivity: Arc<Connectivity>,
    config: SyncConfig,
    // Held for the duration of a pass so an entry is never replayed twice
    // concurrently.
    pass: Mutex<()>,
}

impl SyncReconciler {
    pub fn new(
        validator: Validator,
        queue: OfflineQueue,
        connectivity: Arc<Connectivity>,
        config: SyncConfig,
    ) -> Self {
        Self {
            validator,
            queue,
            connectivity,
            config,
            pass: Mutex::new(()),
        }
    }

    pub async fn sync_once(&self) -> Result<SyncReport, QueueError> {
        let _pass = self.pass.lock().await;
        let mut report = SyncReport::default();

        if !self.connectivity.is_online() {
            report.interrupted = true;
            return Ok(report);
        }

        let entries = self.queue.pending(self.config.batch_size).await?;
        for entry in entries {
            match self.replay(&entry).await? {
                Replay::Resolved(resolution) => {
                    self.queue.mark_synced(entry.id, resolution).await?;
                    match resolution {
                        SyncResolution::Accepted => report.accepted += 1,
                        SyncResolution::Conflict => report.conflicts += 1,
                        SyncResolution::Rejected => report.rejected += 1,
                        SyncResolution::Abandoned => report.abandoned += 1,
                    }
                }
                Replay::Unreachable(message) => {
                    self.queue.record_outage(entry.id, &message).await?;
                    self.connectivity.mark_offline();
                    report.failed += 1;
                    report.interrupted = true;
                    break;
                }
                Replay::Failed(message) => {
                    let failures = self.queue.record_failure(entry.id, &message).await?;
                    if failures >= self.config.max_retries {
                        error!(
                            entry_id = entry.id,
                            ticket_code = %entry.ticket_code,
                            failures,
                            error = %message,
                            "Abandoning offline validation"
                        );
                        self.queue.abandon(entry.id, &message).await?;
                        report.abandoned += 1;
                    } else {
                        report.failed += 1;
                    }
                }
            }
        }

        let purged = self
            .queue
            .purge_synced(crate::models::now() - self.config.retention)
            .await?;
        if purged > 0 {
            debug!(purged, "Purged synced offline validations");
        }

        if report.processed() > 0 {
            info!(
                accepted = report.accepted,
                conflicts = report.conflicts,
                rejected = report.rejected,
                failed = report.failed,
                abandoned = report.abandoned,
                "Offline sync pass finished"
            );
        }
        Ok(report)
    }

    async fn replay(&self, entry: &OfflineValidation) -> Result<Replay, QueueError> {
        let code = match TicketCode::parse(&entry.ticket_code) {
            Ok(code) => code,
            Err(e) => {
                warn!(entry_id = entry.id, error = %e, "Queued ticket code is malformed");
                return Ok(Replay::Resolved(SyncResolution::Rejected));
            }
        };

        let request = ValidationRequest {
            code,
            validator_id: entry.validator_id,
            event_id: entry.event_id,
            scanned_at: entry.scanned_at,
        };

        let outcome = match self.validator.validate(&request).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_unavailable() => return Ok(Replay::Unreachable(e.to_string())),
            Err(e) => return Ok(Replay::Failed(e.to_string())),
        };

        Ok(Replay::Resolved(resolve(entry, &outcome)))
    }

    /// Runs a pass every `interval` and whenever connectivity comes back,
    /// until `shutdown` turns true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.connectivity.reconnected() => {
                    debug!("Reconnected, syncing offline validations");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sync reconciler stopping");
                        return;
                    }
                    continue;
                }
            }

            if let Err(e) = self.sync_once().await {
                error!(error = ?e, "Offline sync pass failed");
            }
        }
    }
}

enum Replay {
    Resolved(SyncResolution),
    Unreachable(String),
    Failed(String),
}

/// The remote store has the final word. A `used` ticket carrying this
/// entry's own validator and scan time means an earlier attempt already
/// applied it.
fn resolve(entry: &OfflineValidation, outcome: &ValidationOutcome) -> SyncResolution {
    match outcome {
        ValidationOutcome::Valid { .. } => SyncResolution::Accepted,
        ValidationOutcome::AlreadyUsed {
            validated_by,
            validated_at,
            ..
        } => {
            if *validated_by == Some(entry.validator_id)
                && *validated_at == Some(entry.scanned_at)
            {
                SyncResolution::Accepted
            } else {
                warn!(
                    entry_id = entry.id,
                    ticket_code = %entry.ticket_code,
                    offline_validator = %entry.validator_id,
                    winning_validator = ?validated_by,
                    "Offline validation conflicts with remote state"
                );
                SyncResolution::Conflict
            }
        }
        ValidationOutcome::Invalid { .. }
        | ValidationOutcome::Cancelled { .. }
        | ValidationOutcome::Expired { .. }
        | ValidationOutcome::Queued { .. } => SyncResolution::Rejected,
    }
}
