//! Application state shared across routes

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::Config;
use crate::store::{RestClient, RestStatsStore, StatsSink};
use crate::tournament::{BotRegistry, TournamentService};
use crate::util::rate_limit::BotEndpointLimiter;

/// Observer messages buffered per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<BotRegistry>,
    pub tournament: Arc<TournamentService>,
    pub limiter: BotEndpointLimiter,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let registry = Arc::new(BotRegistry::new(config.host_password.clone()));

        // Stats storage is optional
        let stats_sink = config.stats_store_url.as_ref().map(|url| {
            let rest = RestClient::new(url.clone(), config.stats_store_key.clone());
            info!(table = %rest.table_url(), "Match stats will be stored");
            Arc::new(RestStatsStore::new(rest)) as Arc<dyn StatsSink>
        });

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let tournament = Arc::new(TournamentService::new(config.game.clone(), stats_sink, events));

        Self {
            config,
            registry,
            tournament,
            limiter: BotEndpointLimiter::new(),
        }
    }
}
