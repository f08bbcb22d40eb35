//! Ticket lookup and the `active -> used` validation transition.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{OfflineValidation, Ticket, TicketStatus};

pub mod code;
pub mod validator;

pub use code::TicketCode;
pub use validator::{AttendanceSummary, CancelOutcome, ValidationRequest, Validator};

/// What a door scanner is told about a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Valid,
    AlreadyUsed,
    Invalid,
    Cancelled,
    Expired,
}

impl From<TicketStatus> for TicketState {
    fn from(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Active => TicketState::Valid,
            TicketStatus::Used => TicketState::AlreadyUsed,
            TicketStatus::Cancelled => TicketState::Cancelled,
            TicketStatus::Expired => TicketState::Expired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    MalformedCode,
    NotFound,
    WrongEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lookup {
    pub ticket_code: String,
    pub state: TicketState,
    pub ticket: Option<Ticket>,
}

impl Lookup {
    pub fn of(ticket_code: String, ticket: Option<Ticket>) -> Self {
        let state = ticket
            .as_ref()
            .map_or(TicketState::Invalid, |t| TicketState::from(t.status));
        Self {
            ticket_code,
            state,
            ticket,
        }
    }
}

/// Result of a single validation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// This attempt moved the ticket to `used`. Let the holder in.
    Valid { ticket: Ticket },
    AlreadyUsed {
        ticket_code: String,
        validated_by: Option<Uuid>,
        validated_at: Option<DateTime<Utc>>,
        /// Decided from local offline state, not the remote store.
        provisional: bool,
    },
    Invalid {
        ticket_code: String,
        reason: InvalidReason,
    },
    Cancelled { ticket_code: String },
    Expired { ticket_code: String },
    /// Accepted while offline; the remote store has not confirmed it yet.
    Queued { entry: OfflineValidation },
}

impl ValidationOutcome {
    pub fn malformed(raw: &str) -> Self {
        ValidationOutcome::Invalid {
            ticket_code: raw.trim().to_string(),
            reason: InvalidReason::MalformedCode,
        }
    }

    /// Whether the holder should be let through the door.
    pub fn admits_entry(&self) -> bool {
        matches!(
            self,
            ValidationOutcome::Valid { .. } | ValidationOutcome::Queued { .. }
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Valid { .. } => "valid",
            ValidationOutcome::AlreadyUsed { .. } => "already_used",
            ValidationOutcome::Invalid { .. } => "invalid",
            ValidationOutcome::Cancelled { .. } => "cancelled",
            ValidationOutcome::Expired { .. } => "expired",
            ValidationOutcome::Queued { .. } => "queued",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_without_ticket_is_invalid() {
        let lookup = Lookup::of("TKT-MISSING".to_string(), None);
        assert_eq!(lookup.state, TicketState::Invalid);
    }

    #[test]
    fn test_outcome_serializes_with_result_tag() {
        let outcome = ValidationOutcome::malformed("  ?? ");
        let json = serde_json::to_value(&outcome).unwrap();

        assert_eq!(json["result"], "invalid");
        assert_eq!(json["reason"], "malformed_code");
        assert_eq!(json["ticket_code"], "??");
        assert!(!outcome.admits_entry());
    }
}
