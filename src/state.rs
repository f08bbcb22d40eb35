use std::sync::Arc;

use crate::gate::Gate;
use crate::sync::SyncReconciler;

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gate>,
    pub reconciler: Arc<SyncReconciler>,
}
