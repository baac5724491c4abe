//! Application bootstrap and dependency wiring (§4.K).
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together in dependency order:
//! cancellation token, domain state, plan store + cache, pub/sub client,
//! planner, fast streamer, UDP repeater, event bridge, connection manager.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rumqttc::EventLoop;
use tokio_util::sync::CancellationToken;

use crate::api::WsConnectionManager;
use crate::config::AppConfig;
use crate::events::BroadcastEventBridge;
use crate::faststreamer::FastStreamer;
use crate::planner::Planner;
use crate::plans::{PlanCache, PlanStore};
use crate::protocol_constants::{EVENT_CHANNEL_CAPACITY, PLAN_CACHE_TTL_SECS};
use crate::pubsub::PubSubClient;
use crate::repeater::UdpRepeater;
use crate::runtime::TokioSpawner;
use crate::state::DomainState;

/// Container for all bootstrapped services, handed to the binary entry point.
#[derive(Clone)]
pub struct BootstrappedServices {
    pub config: Arc<AppConfig>,
    pub state: Arc<DomainState>,
    pub plan_cache: Arc<PlanCache>,
    pub pubsub: Arc<PubSubClient>,
    pub planner: Arc<Planner>,
    pub fast_streamer: Arc<FastStreamer>,
    pub udp_repeater: Arc<UdpRepeater>,
    pub event_bridge: Arc<BroadcastEventBridge>,
    pub ws_manager: Arc<WsConnectionManager>,
    pub spawner: TokioSpawner,
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Initiates graceful shutdown of every background worker.
    pub fn shutdown(&self) {
        log::info!("[bootstrap] cancelling shared token, workers will drain shortly");
        self.cancel_token.cancel();
    }
}

/// Bootstraps all application services with their dependencies. Returns the
/// service container plus the MQTT event loop, which the caller must drive
/// via [`PubSubClient::run`] (it isn't `Clone`, so it can't live on the
/// container itself).
pub fn bootstrap_services(config: AppConfig, plans_dir: impl Into<PathBuf>) -> (BootstrappedServices, EventLoop) {
    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();

    config.warn_on_overlapping_planner_window();

    let state = Arc::new(DomainState::from_config(&config, config.mqtt.heartbeat_timeout_secs));
    let plan_store = PlanStore::new(plans_dir.into());
    let plan_cache = Arc::new(PlanCache::new(plan_store, Duration::from_secs(PLAN_CACHE_TTL_SECS)));

    let (pubsub_client, eventloop) = PubSubClient::new(&config.mqtt);
    let pubsub = Arc::new(pubsub_client);

    let planner = Arc::new(Planner::new(Arc::clone(&state), Arc::clone(&plan_cache), Arc::clone(&pubsub)));
    let fast_streamer = Arc::new(FastStreamer::new(Arc::clone(&state)));
    let udp_repeater = Arc::new(UdpRepeater::new(Arc::clone(&state)));

    let event_bridge = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    let ws_manager = Arc::new(WsConnectionManager::new());

    let services = BootstrappedServices {
        config: Arc::new(config),
        state,
        plan_cache,
        pubsub,
        planner,
        fast_streamer,
        udp_repeater,
        event_bridge,
        ws_manager,
        spawner,
        cancel_token,
    };

    (services, eventloop)
}
