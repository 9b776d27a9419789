use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bus::EventBus;
use crate::bus::sync::StatusSynchronizer;
use crate::config::Config;
use crate::engine::queue::DispatchRequest;
use crate::engine::ranking::{FewestActiveOrders, RankingPolicy};
use crate::observability::metrics::Metrics;
use crate::store::memory::{
    MemoryAgentStore, MemoryOfferStore, MemoryOrderStore, MemoryZoneStore,
};
use crate::store::{AgentStore, OfferStore, OrderStore, ZoneStore};
use crate::tracker::AvailabilityTracker;

pub struct AppState {
    pub config: Config,
    pub orders: Arc<dyn OrderStore>,
    pub agents: Arc<dyn AgentStore>,
    pub offers: Arc<dyn OfferStore>,
    pub zones: Arc<dyn ZoneStore>,
    pub tracker: AvailabilityTracker,
    pub synchronizer: StatusSynchronizer,
    pub ranking: Box<dyn RankingPolicy>,
    pub dispatch_tx: mpsc::Sender<DispatchRequest>,
    pub metrics: Metrics,
}

impl AppState {
    /// In-memory backing with the reference ranking policy.
    pub fn new(config: Config) -> (Self, mpsc::Receiver<DispatchRequest>) {
        Self::with_parts(
            config,
            Arc::new(MemoryOrderStore::new()),
            Arc::new(MemoryAgentStore::new()),
            Arc::new(MemoryOfferStore::new()),
            Arc::new(MemoryZoneStore::new()),
            Box::new(FewestActiveOrders),
        )
    }

    /// Stores and the ranking policy are injected here so alternate backends
    /// and policies drop in without touching the coordinator.
    pub fn with_parts(
        config: Config,
        orders: Arc<dyn OrderStore>,
        agents: Arc<dyn AgentStore>,
        offers: Arc<dyn OfferStore>,
        zones: Arc<dyn ZoneStore>,
        ranking: Box<dyn RankingPolicy>,
    ) -> (Self, mpsc::Receiver<DispatchRequest>) {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(config.dispatch_queue_size);
        let metrics = Metrics::new();
        let bus = EventBus::new(config.event_buffer_size);
        let synchronizer = StatusSynchronizer::new(bus, orders.clone(), metrics.clone());
        let tracker = AvailabilityTracker::new(agents.clone(), config.agent_order_cap);

        (
            Self {
                config,
                orders,
                agents,
                offers,
                zones,
                tracker,
                synchronizer,
                ranking,
                dispatch_tx,
                metrics,
            },
            dispatch_rx,
        )
    }
}
