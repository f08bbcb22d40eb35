use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use crate::store::TicketStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Online,
    Offline,
}

/// Whether the gateway currently believes the remote store is reachable.
pub struct Connectivity {
    online: AtomicBool,
    reconnected: Notify,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            reconnected: Notify::new(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn mode(&self) -> Mode {
        if self.is_online() {
            Mode::Online
        } else {
            Mode::Offline
        }
    }

    /// Returns `true` if this call switched the gateway offline.
    pub fn mark_offline(&self) -> bool {
        let was_online = self.online.swap(false, Ordering::SeqCst);
        if was_online {
            warn!("Remote ticket store unreachable, switching to offline mode");
        }
        was_online
    }

    /// Returns `true` if this call brought the gateway back online, in which
    /// case the reconciler is woken up.
    pub fn mark_online(&self) -> bool {
        let was_online = self.online.swap(true, Ordering::SeqCst);
        if !was_online {
            info!("Remote ticket store reachable again, switching to online mode");
            self.reconnected.notify_one();
        }
        !was_online
    }

    pub async fn reconnected(&self) {
        self.reconnected.notified().await;
    }
}

/// Pings the remote store every `interval` while offline and flips the
/// gateway back online once it answers. Exits when `shutdown` turns true.
pub async fn run_probe(
    connectivity: Arc<Connectivity>,
    store: Arc<dyn TicketStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!("Connectivity probe stopping");
                    return;
                }
                continue;
            }
        }

        if connectivity.is_online() {
            continue;
        }

        match store.ping().await {
            Ok(()) => {
                connectivity.mark_online();
            }
            Err(e) => debug!(error = %e, "Remote ticket store still unreachable"),
        }
    }
}
