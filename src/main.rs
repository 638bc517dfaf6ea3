//! TourGuide Engine
//!
//! Tracks user locations and turns visits near attractions into reward points.
//!
//! # Architecture
//!
//! - **Location Tracker**: Periodically polls the location source for every user
//! - **Reward Updater**: Scheduled reward pass over all users on a bounded worker pool
//! - **API Server**: REST endpoints for users, attractions and rewards
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - A running reward pass stops issuing oracle calls
//! - A tracking sweep stops before its next user

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tourguide::api::{self, AppState};
use tourguide::config::OracleMode;
use tourguide::geo::{AttractionCatalog, BuiltinCatalog, FileCatalog};
use tourguide::rewards::{BasePointsOracle, HttpRewardsOracle, SimulatedRewardsCentral};
use tourguide::users::internal::generate_internal_users;
use tourguide::{
    AttractionIndex, Config, OracleAdapter, ProximitySettings, RewardCoordinator, RewardEngine,
    RewardPointsOracle, SimulatedGps, TourGuideService, TourGuideSettings, UserRepository,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 TourGuide Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");
    info!("  Components:");
    info!("    • Location Tracker");
    info!("    • Reward Updater");
    info!("    • REST API Server");
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Arc::new(Config::from_env()?);
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "metrics")]
    install_metrics_exporter(config.api.metrics_port)?;

    // Create shutdown channel
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Attraction catalog
    let attractions = match &config.catalog.attractions_file {
        Some(path) => FileCatalog::new(path).attractions(),
        None => BuiltinCatalog.attractions(),
    }
    .context("failed to load attraction catalog")?;
    info!("✅ {} attractions loaded", attractions.len());

    // Rewards oracle
    let oracle: Arc<dyn RewardPointsOracle> = match (config.oracle.mode, &config.oracle.url) {
        (OracleMode::Http, Some(url)) => {
            info!("🔗 Using remote rewards oracle");
            Arc::new(HttpRewardsOracle::new(url.clone(), config.oracle.call_timeout)?)
        }
        (OracleMode::BasePoints, _) => {
            info!("📋 Using catalog base points as rewards oracle");
            Arc::new(BasePointsOracle)
        }
        _ => {
            info!("🎲 Using simulated rewards oracle");
            Arc::new(SimulatedRewardsCentral::new(
                config.oracle.simulated_min_latency,
                config.oracle.simulated_max_latency,
            ))
        }
    };

    let engine = RewardEngine::new(
        Arc::new(AttractionIndex::new(attractions)?),
        OracleAdapter::new(oracle, config.oracle.call_timeout),
        Arc::new(ProximitySettings::new(
            config.rewards.default_proximity_buffer_miles,
        )?),
    );
    let coordinator = RewardCoordinator::new(engine, config.rewards.worker_count);

    // User repository
    let users = if config.tracking.test_mode {
        info!("🧪 Test mode: generating {} internal users", config.tracking.internal_user_count);
        UserRepository::with_users(generate_internal_users(config.tracking.internal_user_count))
    } else {
        UserRepository::new()
    };
    info!("✅ {} users loaded", users.len());

    let tour_guide = TourGuideService::new(
        Arc::new(users),
        coordinator,
        Arc::new(SimulatedGps),
        TourGuideSettings {
            attraction_proximity_range_miles: config.rewards.attraction_proximity_range_miles,
            nearby_attractions_count: config.rewards.nearby_attractions_count,
            batch_timeout: config.rewards.batch_timeout,
        },
    );
    let state = Arc::new(AppState::new(tour_guide, &config.api));

    // Spawn all services
    let mut handles = Vec::new();

    if config.tracking.tracking_interval.is_zero() {
        info!("📍 Location tracker disabled");
    } else {
        info!("📍 Starting location tracker...");
        handles.push(spawn_location_tracker(
            state.clone(),
            config.tracking.tracking_interval,
            shutdown_tx.subscribe(),
        ));
    }

    info!("🎁 Starting reward updater...");
    handles.push(spawn_reward_updater(
        state.clone(),
        config.rewards.update_interval,
        shutdown_tx.subscribe(),
    ));

    info!("🌐 Starting API server on port {}...", config.api.port);
    handles.push(spawn_api_server(
        state.clone(),
        config.clone(),
        shutdown_tx.subscribe(),
    ));

    info!("═══════════════════════════════════════════════════════════════");
    info!("  ✅ All services started successfully");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    // Wait for shutdown signal or service failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("📴 Shutdown signal received");
        }
        _ = wait_for_any_failure(&mut handles) => {
            warn!("⚠️ A service failed, initiating shutdown");
        }
    }

    // Graceful shutdown
    info!("🛑 Initiating graceful shutdown...");

    // Signal all services to stop
    let _ = shutdown_tx.send(());

    // Wait for services to finish with timeout
    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, shutdown_services(handles))
        .await
        .is_err()
    {
        warn!("⚠️ Shutdown timeout exceeded, forcing exit");
    }

    info!("👋 TourGuide Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("tourguide=debug,tourguide_engine=debug,tower_http=debug,reqwest=warn,info")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(std::env::var("NO_COLOR").is_err()),
            )
            .init();
    }
}

#[cfg(feature = "metrics")]
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("failed to install Prometheus exporter")?;
    info!("📈 Prometheus metrics on port {}", port);
    Ok(())
}

/// Spawn the periodic location tracker
fn spawn_location_tracker(
    state: Arc<AppState>,
    tracking_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tracking_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !run_tracking_sweep(&state, &mut shutdown_rx).await {
                        info!("Location tracker shutting down mid-sweep");
                        break;
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Location tracker shutting down");
                    break;
                }
            }
        }
    })
}

/// One tracking sweep; returns `false` when shutdown interrupted it
async fn run_tracking_sweep(state: &AppState, shutdown_rx: &mut broadcast::Receiver<()>) -> bool {
    let cancel = CancellationToken::new();
    let sweep = state.tour_guide.track_all_users_until(&cancel);
    tokio::pin!(sweep);

    tokio::select! {
        _ = &mut sweep => true,
        _ = shutdown_rx.recv() => {
            // Finish the user in progress, skip the rest
            cancel.cancel();
            sweep.await;
            false
        }
    }
}

/// Spawn the scheduled reward pass
fn spawn_reward_updater(
    state: Arc<AppState>,
    update_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(update_interval);

        // Skip first tick (runs immediately otherwise)
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    info!("🎁 Running scheduled reward pass...");
                    let report = run_reward_pass(&state, &mut shutdown_rx).await;
                    match report {
                        Some(report) if report.is_clean() => {
                            info!("✅ Reward pass completed in {}ms", report.elapsed_ms);
                        }
                        Some(report) => {
                            warn!(
                                "⚠️ Reward pass finished with {} failed users (incomplete: {})",
                                report.failed_users(),
                                report.incomplete
                            );
                        }
                        None => {
                            info!("Reward updater shutting down mid-pass");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Reward updater shutting down");
                    break;
                }
            }
        }
    })
}

/// One bounded reward pass that also stops early on shutdown.
/// Returns `None` when shutdown interrupted it.
async fn run_reward_pass(
    state: &AppState,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Option<tourguide::BatchReport> {
    let cancel = CancellationToken::new();
    let pass = state.tour_guide.calculate_all_rewards_until(&cancel);
    tokio::pin!(pass);

    tokio::select! {
        report = &mut pass => Some(report),
        _ = shutdown_rx.recv() => {
            // Stop issuing oracle calls and let in-flight ones finish
            cancel.cancel();
            let report = pass.await;
            info!(
                "Reward pass cancelled: {}/{} users done",
                report.users_completed, report.users_total
            );
            None
        }
    }
}

/// Spawn the API server
fn spawn_api_server(
    state: Arc<AppState>,
    config: Arc<Config>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.recv().await;
            info!("API server shutting down");
        };
        if let Err(e) = api::start_server(state, &config.api, shutdown).await {
            error!("API server error: {:?}", e);
        }
    })
}

/// Wait for any task to fail
async fn wait_for_any_failure(handles: &mut [tokio::task::JoinHandle<()>]) {
    loop {
        for handle in handles.iter_mut() {
            if handle.is_finished() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for all services to complete shutdown
async fn shutdown_services(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        let _ = handle.await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
