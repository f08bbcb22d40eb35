use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::validation::code::TicketCode;

/// Lifecycle status of a ticket as stored in the `tickets.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Active,
    Used,
    Expired,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Active => "active",
            TicketStatus::Used => "used",
            TicketStatus::Expired => "expired",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// Only `active` tickets may move, and only to `used` or `cancelled`.
    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Active, TicketStatus::Used)
                | (TicketStatus::Active, TicketStatus::Cancelled)
        )
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown ticket status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TicketStatus::Active),
            "used" => Ok(TicketStatus::Used),
            "expired" => Ok(TicketStatus::Expired),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub event_id: Uuid,
    pub ticket_code: String,
    pub qr_payload: String,
    pub status: TicketStatus,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ticket {
    /// Builds a fresh `active` ticket for the given purchase.
    pub fn issue(purchase_id: Uuid, event_id: Uuid, code: TicketCode) -> Self {
        let now = super::now();
        Self {
            id: Uuid::new_v4(),
            purchase_id,
            event_id,
            qr_payload: code.qr_payload(),
            ticket_code: code.into_string(),
            status: TicketStatus::Active,
            validated_by: None,
            validated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw `tickets` row; status is kept as text until converted into a [`Ticket`].
#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub event_id: Uuid,
    pub ticket_code: String,
    pub qr_payload: String,
    pub status: String,
    pub validated_by: Option<Uuid>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = UnknownStatus;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: row.id,
            purchase_id: row.purchase_id,
            event_id: row.event_id,
            ticket_code: row.ticket_code,
            qr_payload: row.qr_payload,
            status: row.status.parse()?,
            validated_by: row.validated_by,
            validated_at: row.validated_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_tickets_transition() {
        assert!(TicketStatus::Active.can_transition_to(TicketStatus::Used));
        assert!(TicketStatus::Active.can_transition_to(TicketStatus::Cancelled));
        assert!(!TicketStatus::Active.can_transition_to(TicketStatus::Expired));
        assert!(!TicketStatus::Used.can_transition_to(TicketStatus::Cancelled));
        assert!(!TicketStatus::Used.can_transition_to(TicketStatus::Used));
        assert!(!TicketStatus::Cancelled.can_transition_to(TicketStatus::Used));
    }

    #[test]
    fn test_status_text_round_trips_through_column_values() {
        for status in [
            TicketStatus::Active,
            TicketStatus::Used,
            TicketStatus::Expired,
            TicketStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TicketStatus>(), Ok(status));
        }
        assert!("USED".parse::<TicketStatus>().is_err());
    }

    #[test]
    fn test_row_with_unknown_status_is_rejected() {
        let now = Utc::now();
        let row = TicketRow {
            id: Uuid::new_v4(),
            purchase_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            ticket_code: "TKT-ABC123".to_string(),
            qr_payload: "TICKET:TKT-ABC123".to_string(),
            status: "refunded".to_string(),
            validated_by: None,
            validated_at: None,
            created_at: now,
            updated_at: now,
        };

        let err = Ticket::try_from(row).unwrap_err();
        assert_eq!(err, UnknownStatus("refunded".to_string()));
    }

    #[test]
    fn test_issued_ticket_is_active_with_qr_payload() {
        let code = TicketCode::parse("tkt-000111").unwrap();
        let ticket = Ticket::issue(Uuid::new_v4(), Uuid::new_v4(), code);

        assert_eq!(ticket.status, TicketStatus::Active);
        assert_eq!(ticket.ticket_code, "TKT-000111");
        assert_eq!(ticket.qr_payload, "TICKET:TKT-000111");
        assert!(ticket.validated_by.is_none());
    }
}
