//! Airwatch Agent - builds a local history of one PurpleAir sensor
//!
//! On start the agent:
//! - loads its configuration and the PurpleAir read key
//! - creates a fresh `database_<timestamp>` directory
//! - records one reading right away (creating the SQLite table / CSV file)
//! - appends a new reading every `interval_minutes` until interrupted

mod config;
mod credentials;
mod purpleair;
mod run_dir;
mod scheduler;

use airwatch_core::{Flattener, Pipeline, Recorder, RecorderContext};
use anyhow::{Context, Result};
use chrono::Local;
use config::AgentConfig;
use purpleair::PurpleAirClient;
use scheduler::{Scheduler, StopReason};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "airwatch_agent=info,airwatch_core=info";

/// Main agent state
struct Agent {
    pipeline: Pipeline<PurpleAirClient>,
    scheduler: Scheduler,
}

impl Agent {
    /// Everything that can fail before the first tick fails here.
    async fn new(config: AgentConfig) -> Result<Self> {
        info!("Initializing Airwatch Agent v{}", env!("CARGO_PKG_VERSION"));

        let key = credentials::read_api_key(&config.credentials.key_file)
            .await
            .context("Failed to load PurpleAir API key")?;

        let run_dir = run_dir::create_run_dir(&config.output.base_dir, &Local::now())
            .await
            .context("Failed to prepare output directory")?;

        let ctx = RecorderContext {
            run_dir,
            sensor_id: config.sensor.id.clone(),
            sqlite: config.output.sqlite,
            csv: config.output.csv,
        };
        let recorder = Recorder::open(&ctx).context("Failed to open history sinks")?;
        let sinks = recorder.sink_kinds();

        let client = PurpleAirClient::new(&config.sensor, key)
            .context("Failed to build PurpleAir client")?;

        let pipeline = Pipeline::new(
            client,
            Flattener::new(config.flatten.depth3_keys),
            recorder,
            config.sensor.id.clone(),
        );
        let mut scheduler = Scheduler::new(
            config.schedule.poll_interval(),
            config.failure.build_policy(),
        );
        if let Some(max) = config.schedule.max_ticks {
            scheduler = scheduler.with_max_ticks(max);
        }

        info!(
            "Agent initialized - sensor: {}, sinks: {:?}, failure policy: {:?}",
            ctx.sensor_id, sinks, config.failure.policy
        );

        Ok(Self { pipeline, scheduler })
    }

    /// Start agent main loop
    async fn run(&mut self) -> Result<()> {
        let summary = self
            .scheduler
            .run_until(&mut self.pipeline, shutdown_signal())
            .await
            .context("Recording stopped on a failed tick")?;

        match summary.stop {
            StopReason::Interrupted => info!(
                "Stopped by signal - {} readings recorded, {} skipped",
                summary.recorded, summary.skipped
            ),
            StopReason::TickLimit => info!("Tick limit reached after {} ticks", summary.ticks),
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a signal handler the agent simply runs until killed.
        tracing::warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    info!("Airwatch Agent starting...");

    let config = AgentConfig::load().await.context("Failed to load configuration")?;

    let mut agent = Agent::new(config).await.context("Failed to create agent")?;

    agent.run().await.context("Agent execution failed")?;

    Ok(())
}
