//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::ledger::LedgerService;
use crate::store::TokenStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
}

impl AppState {
    pub fn new(ledger: Arc<LedgerService>) -> Self {
        Self { ledger }
    }

    /// State over an arbitrary store, mostly for tests and local runs.
    pub fn with_store(store: Arc<dyn TokenStore>) -> Self {
        Self::new(Arc::new(LedgerService::new(store)))
    }
}

impl FromRef<AppState> for Arc<LedgerService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.ledger.clone()
    }
}
