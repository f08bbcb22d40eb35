//! Deferred synchronization of offline scans.

pub mod connectivity;
pub mod reconciler;

pub use connectivity::{run_probe, Connectivity, Mode};
pub use reconciler::{SyncConfig, SyncReconciler, SyncReport};
