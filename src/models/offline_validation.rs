use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How the remote store settled a queued validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncResolution {
    /// The remote store applied this validation.
    Accepted,
    /// Another validator won the ticket first; the remote state stands.
    Conflict,
    /// Unknown, cancelled or expired ticket, or one from another event.
    Rejected,
    /// Gave up after repeated non-connectivity failures. Not synced.
    Abandoned,
}

impl SyncResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncResolution::Accepted => "accepted",
            SyncResolution::Conflict => "conflict",
            SyncResolution::Rejected => "rejected",
            SyncResolution::Abandoned => "abandoned",
        }
    }

    /// Whether the remote store has seen and decided the entry.
    pub fn is_synced(&self) -> bool {
        !matches!(self, SyncResolution::Abandoned)
    }
}

impl fmt::Display for SyncResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(SyncResolution::Accepted),
            "conflict" => Ok(SyncResolution::Conflict),
            "rejected" => Ok(SyncResolution::Rejected),
            "abandoned" => Ok(SyncResolution::Abandoned),
            other => Err(format!("unknown sync resolution '{other}'")),
        }
    }
}

/// A scan accepted while the remote store was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineValidation {
    pub id: i64,
    pub local_id: Uuid,
    pub ticket_code: String,
    pub validator_id: Uuid,
    pub event_id: Option<Uuid>,
    pub scanned_at: DateTime<Utc>,
    pub synced: bool,
    /// Replay attempts that failed for any reason.
    pub retry_count: u32,
    /// Failed attempts where the store answered with an error.
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub resolution: Option<SyncResolution>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl OfflineValidation {
    pub fn is_pending(&self) -> bool {
        self.resolution.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewOfflineValidation {
    pub ticket_code: String,
    pub validator_id: Uuid,
    pub event_id: Option<Uuid>,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct OfflineValidationRow {
    pub id: i64,
    pub local_id: Uuid,
    pub ticket_code: String,
    pub validator_id: Uuid,
    pub event_id: Option<Uuid>,
    pub scanned_at: DateTime<Utc>,
    pub synced: bool,
    pub retry_count: i64,
    pub failure_count: i64,
    pub last_error: Option<String>,
    pub resolution: Option<String>,
    pub synced_at: Option<DateTime<Utc>>,
}

impl TryFrom<OfflineValidationRow> for OfflineValidation {
    type Error = String;

    fn try_from(row: OfflineValidationRow) -> Result<Self, Self::Error> {
        let resolution = row
            .resolution
            .as_deref()
            .map(SyncResolution::from_str)
            .transpose()?;

        Ok(OfflineValidation {
            id: row.id,
            local_id: row.local_id,
            ticket_code: row.ticket_code,
            validator_id: row.validator_id,
            event_id: row.event_id,
            scanned_at: row.scanned_at,
            synced: row.synced,
            retry_count: u32::try_from(row.retry_count)
                .map_err(|_| format!("retry count {} out of range", row.retry_count))?,
            failure_count: u32::try_from(row.failure_count)
                .map_err(|_| format!("failure count {} out of range", row.failure_count))?,
            last_error: row.last_error,
            resolution,
            synced_at: row.synced_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandoned_is_the_only_unsynced_resolution() {
        assert!(SyncResolution::Accepted.is_synced());
        assert!(SyncResolution::Conflict.is_synced());
        assert!(SyncResolution::Rejected.is_synced());
        assert!(!SyncResolution::Abandoned.is_synced());
    }

    #[test]
    fn test_row_conversion_rejects_negative_retry_count() {
        let row = OfflineValidationRow {
            id: 1,
            local_id: Uuid::new_v4(),
            ticket_code: "TKT-AAAAAA".to_string(),
            validator_id: Uuid::new_v4(),
            event_id: None,
            scanned_at: Utc::now(),
            synced: false,
            retry_count: -1,
            failure_count: 0,
            last_error: None,
            resolution: None,
            synced_at: None,
        };

        assert!(OfflineValidation::try_from(row).is_err());
    }
}
