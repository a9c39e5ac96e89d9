use std::sync::Arc;

use posematch_db::{PlayStore, RangeAggregator};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: the store and config sit behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Play storage (Postgres or in-memory).
    pub store: Arc<dyn PlayStore>,
    /// Range-summary merger over the same store.
    pub aggregator: RangeAggregator,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn PlayStore>, config: ServerConfig) -> Self {
        let aggregator = RangeAggregator::new(Arc::clone(&store));
        Self {
            store,
            aggregator,
            config: Arc::new(config),
        }
    }
}
