//! Lighting hub server - standalone binary wiring the core crate's domain
//! services to the operator HTTP/WS surface.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ledhub_core::{bootstrap_services, start_server, AppState, EventEmitter};
use tokio::signal;

use crate::config::ServerConfig;

/// Lighting hub server - coordinates LED dimmers over MQTT and UDP.
#[derive(Parser, Debug)]
#[command(name = "ledhub-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the topology/transport configuration file (YAML).
    #[arg(short, long, value_name = "FILE", env = "LEDHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Operator HTTP/WS bind port.
    #[arg(short, long, env = "LEDHUB_BIND_PORT")]
    port: Option<u16>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "LEDHUB_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory holding plan JSON files.
    #[arg(long, value_name = "DIR", env = "LEDHUB_PLANS_DIR")]
    plans_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut server_config = ServerConfig::default();
    if let Some(config) = args.config {
        server_config.config_path = config;
    }
    if let Some(port) = args.port {
        server_config.bind_port = port;
    }
    if let Some(plans_dir) = args.plans_dir {
        server_config.plans_dir = plans_dir;
    }
    if let Some(level) = args.log_level {
        server_config.log_level = level.parse().unwrap_or(log::LevelFilter::Info);
    }

    env_logger::Builder::new()
        .filter_level(server_config.log_level)
        .init();

    log::info!(
        "[main] loading config from {}",
        server_config.config_path.display()
    );
    let app_config = ledhub_core::AppConfig::load(&server_config.config_path).with_context(|| {
        format!(
            "failed to load config file {}",
            server_config.config_path.display()
        )
    })?;

    let (services, eventloop) = bootstrap_services(app_config, server_config.plans_dir.clone());
    log::info!(
        "[main] bootstrapped {} device(s) across {} room(s)",
        services.config.all_devices().count(),
        services.config.rooms.len()
    );

    let pubsub_task = {
        let pubsub = Arc::clone(&services.pubsub);
        let config = Arc::clone(&services.config);
        let state = Arc::clone(&services.state);
        let shutdown = services.cancel_token.clone();
        tokio::spawn(async move { pubsub.run(eventloop, &config, state, shutdown).await })
    };

    let planner_task = {
        let planner = Arc::clone(&services.planner);
        let config = Arc::clone(&services.config);
        let shutdown = services.cancel_token.clone();
        tokio::spawn(async move { planner.run(&config, shutdown).await })
    };

    let fast_streamer_task = {
        let fast_streamer = Arc::clone(&services.fast_streamer);
        let config = Arc::clone(&services.config);
        let shutdown = services.cancel_token.clone();
        tokio::spawn(async move { fast_streamer.run(&config, shutdown).await })
    };

    let udp_repeater_task = {
        let udp_repeater = Arc::clone(&services.udp_repeater);
        let config = Arc::clone(&services.config);
        let shutdown = services.cancel_token.clone();
        tokio::spawn(async move { udp_repeater.run(&config, shutdown).await })
    };

    let liveness_task = {
        let state = Arc::clone(&services.state);
        let emitter = Arc::clone(&services.event_bridge) as Arc<dyn EventEmitter>;
        let shutdown = services.cancel_token.clone();
        tokio::spawn(async move { ledhub_core::broadcaster::run_liveness_ticker(state, emitter, shutdown).await })
    };

    let app_state = AppState {
        config: Arc::clone(&services.config),
        state: Arc::clone(&services.state),
        plan_cache: Arc::clone(&services.plan_cache),
        pubsub: Arc::clone(&services.pubsub),
        event_bridge: Arc::clone(&services.event_bridge),
        ws_manager: Arc::clone(&services.ws_manager),
        shutdown: services.cancel_token.clone(),
    };

    let bind_port = server_config.bind_port;
    let server_task = tokio::spawn(async move { start_server(app_state, bind_port).await });

    shutdown_signal().await;
    log::info!("[main] shutdown signal received, draining workers");
    services.shutdown();

    let _ = tokio::join!(
        pubsub_task,
        planner_task,
        fast_streamer_task,
        udp_repeater_task,
        liveness_task,
        server_task,
    );

    log::info!("[main] shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
