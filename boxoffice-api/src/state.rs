use boxoffice_core::{LockCoordinator, LockPolicy, LockedReservationFacade, ReservationEngine, TicketStore};
use std::sync::Arc;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub facade: Arc<LockedReservationFacade>,
    pub engine: Arc<ReservationEngine>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    /// Wires one engine over `store` behind both the locked write path and the
    /// unlocked read path.
    pub fn new(
        coordinator: Arc<dyn LockCoordinator>,
        store: Arc<dyn TicketStore>,
        policy: LockPolicy,
    ) -> Result<Self, prometheus::Error> {
        let engine = Arc::new(ReservationEngine::new(store));
        let facade = LockedReservationFacade::new(coordinator, engine.clone(), policy);
        Ok(Self {
            facade: Arc::new(facade),
            engine,
            metrics: Arc::new(Metrics::new()?),
        })
    }
}
