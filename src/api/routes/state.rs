use std::sync::Arc;

use crate::database::Database;
use crate::scheduler::CheckScheduler;

/// Shared application state passed to all Axum handlers via `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub scheduler: Arc<CheckScheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<CheckScheduler>) -> Self {
        Self {
            db: scheduler.database().clone(),
            scheduler,
        }
    }
}
