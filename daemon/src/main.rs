use anyhow::Result;
use osgptd::config::load_config;
use osgptd::monitor::{ForegroundApp, ForegroundMonitor, OsascriptFocus};
use osgptd::{DaemonServer, DaemonState, OpenAiClient, Orchestrator, ScriptRunner};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    info!("osgpt daemon (osgptd) starting...");

    let config = load_config()?;

    let foreground = ForegroundApp::new();
    let monitor = ForegroundMonitor::new(
        OsascriptFocus::new(Duration::from_millis(config.monitor.query_timeout_ms)),
        config.monitor.own_name.clone(),
        config.monitor.excluded_apps.clone(),
        foreground.clone(),
    );
    let monitor_task = monitor.spawn(Duration::from_millis(config.monitor.poll_interval_ms));

    let generator = OpenAiClient::new(&config.compiler, config.timeouts.compile_timeout_seconds)?;
    let runner = ScriptRunner::new(config.runner.clone(), config.timeouts.script_timeout_seconds);
    let orchestrator = Orchestrator::new(generator, runner, foreground.clone());

    let state = Arc::new(DaemonState::new(config, foreground, orchestrator));
    let server = DaemonServer::new(shared::default_socket_path(), Arc::clone(&state));

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    state.stop_listening().await;
    monitor_task.abort();
    Ok(())
}
