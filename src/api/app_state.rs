use crate::services::backend::SearchFacade;
use crate::services::health::HealthProbe;
use crate::services::orchestrator::HybridOrchestrator;
use std::sync::Arc;

/// Application state containing all shared services
#[derive(Clone)]
pub struct AppState {
    /// Strategy selection, execution and merge
    pub orchestrator: Arc<HybridOrchestrator>,
    /// Backend facade for document CRUD and similarity lookups
    pub facade: Arc<SearchFacade>,
    /// Health probe for stats and readiness
    pub probe: Arc<HealthProbe>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &"Arc<HybridOrchestrator>")
            .field("collection", &self.facade.collection())
            .field("probe", &"Arc<HealthProbe>")
            .finish()
    }
}

impl AppState {
    pub fn new(
        orchestrator: Arc<HybridOrchestrator>,
        facade: Arc<SearchFacade>,
        probe: Arc<HealthProbe>,
    ) -> Self {
        Self {
            orchestrator,
            facade,
            probe,
        }
    }
}
