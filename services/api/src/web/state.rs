//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use fabula_core::{CascadeService, DocumentStore, FinalizeService, Registry};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub cascade: CascadeService,
    pub finalize: FinalizeService,
}

impl AppState {
    /// Wires the core services onto one store handle.
    pub fn new(config: Arc<Config>, store: Arc<dyn DocumentStore>) -> Self {
        let registry = Registry::new(store);
        let cascade = CascadeService::new(registry.clone());
        let finalize = FinalizeService::new(registry.clone());
        Self { config, registry, cascade, finalize }
    }
}
