use chrono::{DateTime, SubsecRound, Utc};

pub mod event;
pub mod offline_validation;
pub mod ticket;

pub use event::Event;
pub use offline_validation::{NewOfflineValidation, OfflineValidation, SyncResolution};
pub use ticket::{Ticket, TicketRow, TicketStatus};

/// Current time truncated to microseconds, the precision PostgreSQL keeps for
/// `timestamptz`. Scan timestamps are compared after a round trip, so every
/// timestamp this service writes goes through here.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
