use std::sync::Arc;

use lifelink_core::{Clock, Config, StorageBackend, SystemClock};
use lifelink_dispatch::{
    BroadcastSink, Coordinator, DispatchViews, EventSink, FanoutSink, SqliteStore, Stores,
    TracingSink,
};
use tracing::info;

pub struct AppState {
    pub config: Config,
    pub coordinator: Coordinator,
    pub views: DispatchViews,
    pub events: Arc<BroadcastSink>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let stores = match config.storage.backend {
            StorageBackend::Memory => Stores::in_memory(clock),
            StorageBackend::Sqlite => {
                let store = SqliteStore::open(&config.storage.database_path, clock)?;
                Stores::sqlite(Arc::new(store))
            }
        };
        info!(backend = config.storage.backend.as_str(), "Dispatch stores ready");

        Ok(Self::with_stores(config, stores))
    }

    pub fn with_stores(config: Config, stores: Stores) -> Self {
        let events = Arc::new(BroadcastSink::new(config.events.channel_capacity));
        let sink: Arc<dyn EventSink> = Arc::new(
            FanoutSink::new()
                .with(Arc::new(TracingSink))
                .with(events.clone()),
        );
        let views = DispatchViews::new(&stores);

        AppState {
            config,
            coordinator: Coordinator::new(stores, sink),
            views,
            events,
        }
    }
}
