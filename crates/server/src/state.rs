use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use newswire_bus::Bus;
use newswire_core::config::SchedulerConfig;
use newswire_store::RecordStore;
use newswire_sync::{BusBridge, Fetcher, Propagator, Reconciler, Scheduler, SubscriberHub};

/// Process-wide singletons shared by handlers and background tasks.
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub hub: Arc<SubscriberHub>,
    pub bridge: Arc<BusBridge>,
    pub propagator: Arc<Propagator>,
    pub scheduler: Arc<Scheduler>,
    /// Cancelled once on shutdown; stops the scheduler, the bus consumer and
    /// open WebSocket sessions.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the engine together around an already-connected store and bus.
    pub fn new(
        store: Arc<dyn RecordStore>,
        bus: Option<Arc<dyn Bus>>,
        subject: &str,
        fetcher: Arc<dyn Fetcher>,
        scheduler: &SchedulerConfig,
    ) -> Self {
        let hub = Arc::new(SubscriberHub::new());
        let bridge = Arc::new(BusBridge::new(bus, subject, store.clone(), hub.clone()));
        let propagator = Arc::new(Propagator::new(hub.clone(), bridge.clone()));
        let scheduler = Arc::new(Scheduler::new(
            fetcher,
            Reconciler::new(store.clone()),
            propagator.clone(),
            scheduler,
        ));
        Self {
            store,
            hub,
            bridge,
            propagator,
            scheduler,
            shutdown: CancellationToken::new(),
        }
    }
}
