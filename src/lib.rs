//! Ticket validation gateway.
//!
//! Scanner devices post door scans over HTTP. Each scan is checked against
//! the hosted ticket store with a conditional update, so a ticket is marked
//! used at most once. While the store is unreachable, scans are answered from
//! local state and queued in SQLite, then replayed by the sync reconciler.

pub mod config;
pub mod gate;
pub mod handlers;
pub mod models;
pub mod offline;
pub mod routes;
pub mod state;
pub mod store;
pub mod sync;
pub mod utils;
pub mod validation;
