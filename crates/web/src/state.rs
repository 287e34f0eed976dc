use std::sync::Arc;

use storage::VoteStore;
use storage::services::repair::RepairOptions;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VoteStore>,
    pub repair: RepairOptions,
}

impl AppState {
    pub fn new(store: Arc<dyn VoteStore>, repair: RepairOptions) -> Self {
        Self { store, repair }
    }

    pub fn store(&self) -> &dyn VoteStore {
        self.store.as_ref()
    }
}
