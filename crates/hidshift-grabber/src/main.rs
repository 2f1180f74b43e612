//! hidshift grabber entry point.
//!
//! Loads the configuration and rule file, builds the pipeline and runs it on
//! the tokio runtime until Ctrl-C.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()            -- config.toml (or defaults)
//!  └─ load_connector()         -- rule file -> manipulator chain
//!  └─ PipelineRunner::run()    -- single pipeline task
//!       ├─ input:  MockInputSource (headless; no OS capture backend)
//!       └─ output: LoggingVirtualDevice / LoggingGrabbableStateListener
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hidshift_core::{load_rules, Environment, ManipulatorManager, ManipulatorManagersConnector};
use hidshift_grabber::application::pipeline::{Pipeline, PipelineMessage};
use hidshift_grabber::application::runner::PipelineRunner;
use hidshift_grabber::infrastructure::input_capture::mock::MockInputSource;
use hidshift_grabber::infrastructure::input_capture::InputSource;
use hidshift_grabber::infrastructure::storage::config::{self, AppConfig};
use hidshift_grabber::infrastructure::virtual_device::{
    LoggingGrabbableStateListener, LoggingVirtualDevice,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config::config_file_path().context("failed to locate config file")?;
    let app_config = config::load_config_from(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    // Initialise structured logging.  `RUST_LOG` wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&app_config.grabber.log_level)),
        )
        .init();

    info!(config = %config_path.display(), "hidshift grabber starting");

    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let connector = load_connector(&app_config, base_dir)?;

    let mut environment = Environment::new();
    if let Some(snapshot) = &app_config.grabber.environment_snapshot_file {
        environment.enable_json_output(AppConfig::resolve_path(snapshot, base_dir));
    }

    let pipeline = Pipeline::new(connector, app_config.game_pad).with_environment(environment);
    let runner = PipelineRunner::new(
        pipeline,
        Arc::new(LoggingVirtualDevice::new()),
        Arc::new(LoggingGrabbableStateListener),
    );

    let source = MockInputSource::new();
    let receiver = source.start().context("failed to start input source")?;
    let pipeline_task = tokio::spawn(runner.run(receiver));

    info!("hidshift grabber ready.  Press Ctrl-C to exit.");

    // ── Ctrl-C / SIGTERM handler ──────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    if let Err(e) = source.inject(PipelineMessage::Shutdown) {
        warn!("could not deliver shutdown message: {e}");
    }
    source.stop();
    pipeline_task.await.context("pipeline task failed")?;

    info!("hidshift grabber stopped");
    Ok(())
}

/// Builds the manipulator chain from the configured rule file.
///
/// Without a rule file the chain holds a single empty manager, so input
/// still flows through and environment changes are still applied.
fn load_connector(app_config: &AppConfig, base_dir: &Path) -> anyhow::Result<ManipulatorManagersConnector> {
    let mut connector = ManipulatorManagersConnector::new();

    let Some(rules_file) = &app_config.grabber.rules_file else {
        info!("no rules file configured; input passes through unchanged");
        connector.emplace_back_connection(ManipulatorManager::default());
        return Ok(connector);
    };

    let path = AppConfig::resolve_path(rules_file, base_dir);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read rules file {}", path.display()))?;
    let loaded = load_rules(&json, &app_config.parameters)
        .with_context(|| format!("failed to load rules file {}", path.display()))?;

    // Invalid rules were already reported one by one.
    connector.emplace_back_connection(loaded.into_manager());
    Ok(connector)
}
