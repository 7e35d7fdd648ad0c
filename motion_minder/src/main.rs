use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use moonraker::MoonrakerClient;
use tracing::{error, info, warn};

use motion_minder::{
    accumulator::DistanceAccumulator,
    communication::{TelemetryLink, run_telemetry_stream},
    config::{ConfigOptions, init_config_with_options},
    homing::HomingTracker,
    logging,
    odometer::OdometerHandler,
    persistence::{
        MoonrakerStore, OdometerStore as _, PersistenceScheduler, StoreError,
        spawn_persistence_writer,
    },
    state_monitor::run_readiness_monitor,
};

const FINAL_SAVE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(version, about = "Per-axis travel odometer for Klipper printers")]
struct Cli {
    /// Configuration file, overrides CONFIG_PATH
    #[arg(long)]
    config: Option<PathBuf>,

    /// Motion reports between saves, overrides the configuration file
    #[arg(long)]
    persist_interval: Option<u64>,
}

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut options = match cli.config {
        Some(path) => ConfigOptions::with_path(path),
        None => ConfigOptions::default(),
    };
    options.create_if_missing = should_create_config();

    let (config_manager, mut config) = init_config_with_options(options).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    if let Some(persist_interval) = cli.persist_interval {
        config.persist_interval = persist_interval;
    }
    config.validate()?;

    let _log_guard = logging::init(&config.logging)?;
    info!(
        "Loaded configuration from {}",
        config_manager.path().display()
    );

    let client = MoonrakerClient::new(&config.endpoint)?;
    let websocket_url = client.websocket_url()?;
    let store = MoonrakerStore::new(client.clone(), config.namespace.clone());
    let reconnect = config.reconnect_policy();

    let seed = reconnect
        .retry_if(
            "Loading odometer totals",
            || store.load_totals(),
            StoreError::is_transient,
        )
        .await
        .context("Failed to load stored odometer totals")?;
    info!(
        "Starting from x={:.3} y={:.3} z={:.3}",
        seed.x, seed.y, seed.z
    );

    let homing = HomingTracker::initialize(&client).await;

    let (persistence, writer) = spawn_persistence_writer(store);
    let handler = OdometerHandler::new(
        homing,
        DistanceAccumulator::new(seed),
        PersistenceScheduler::new(config.persist_interval()?),
        persistence,
    )
    .with_reset_position_on_unhome(config.reset_position_on_unhome);
    let (odometer, executor) = handler.spawn();

    let link = TelemetryLink::with_random_id();
    info!(
        "Streaming from {} with request id {}",
        websocket_url,
        link.request_id()
    );

    let mut monitor = tokio::spawn(run_readiness_monitor(
        client,
        link.clone(),
        odometer.clone(),
        config.poll_interval(),
    ));
    let mut stream = tokio::spawn(run_telemetry_stream(
        websocket_url.to_string(),
        link,
        odometer.clone(),
        reconnect,
    ));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
        }
        result = &mut stream => match result {
            Ok(Ok(())) => warn!("Telemetry stream gave up reconnecting"),
            Ok(Err(e)) => error!("Telemetry stream stopped: {}", e),
            Err(e) => error!("Telemetry stream task failed: {}", e),
        },
        result = &mut monitor => match result {
            Ok(Ok(())) => warn!("Readiness monitor stopped"),
            Ok(Err(e)) => error!("Readiness monitor stopped: {}", e),
            Err(e) => error!("Readiness monitor task failed: {}", e),
        },
    }

    monitor.abort();
    stream.abort();

    match odometer.status().await {
        Ok(status) => info!(
            "Processed {} motion reports, homed axes {}, {:?}",
            status.messages_processed, status.homed, status.connection
        ),
        Err(e) => warn!("Odometer status unavailable: {}", e),
    }

    match odometer.flush().await {
        Ok(totals) => info!(
            "Final odometer x={:.3} y={:.3} z={:.3}",
            totals.x, totals.y, totals.z
        ),
        Err(e) => error!("Final flush failed: {}", e),
    }

    // The actor stops once every sender is gone, which closes the writer's queue.
    drop(odometer);
    drop(executor.await.context("Odometer actor panicked")?);

    match tokio::time::timeout(FINAL_SAVE_TIMEOUT, writer).await {
        Ok(result) => result.context("Persistence writer panicked")?,
        Err(_) => warn!("Timed out waiting for the final save"),
    }

    Ok(())
}
