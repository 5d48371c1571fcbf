use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dimmerd::api;
use dimmerd::config::Config;
use dimmerd::engine::Engine;
use dimmerd::engine::SystemClock;
use dimmerd::format_diagnostics;
use dimmerd::persistence::Persistence;
use tokio::sync::oneshot;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Motion-activated adaptive dimmer daemon
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Config file. May be given more than once; earlier files win.
    #[arg(short, long = "config", default_value = "dimmerd.toml")]
    configs: Vec<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (config, diagnostics) = Config::from_files(&args.configs)?;
    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    if args.check {
        println!("Configuration OK: {} dimmer(s)", config.dimmers.len());
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    tracing::info!("dimmerd starting");
    tracing::info!("Loaded config from: {:?}", args.configs);

    let mut engine = Engine::new(&config, Arc::new(SystemClock));
    if let Some(path) = &config.persistence.path {
        engine = engine
            .with_persistence(Persistence::new(path))
            .context("Failed to restore control entities")?;
    }

    let handle = engine.handle();
    let dimmers = config.dimmers.keys().cloned().collect();
    let app = api::router(handle.clone(), dimmers);

    let (engine_shutdown_tx, engine_shutdown_rx) = oneshot::channel();
    let (api_shutdown_tx, api_shutdown_rx) = oneshot::channel();

    let engine_task = tokio::spawn(engine.run(engine_shutdown_rx));
    let api_task = tokio::spawn(api::serve(
        config.api.listen.clone(),
        config.api.port,
        app,
        api_shutdown_rx,
    ));

    handle.ready()?;
    tracing::info!("Press Ctrl+C to exit");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    let _ = api_shutdown_tx.send(());
    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("HTTP API server failed: {}", e),
        Err(e) => tracing::error!("HTTP API task panicked: {}", e),
    }

    let _ = engine_shutdown_tx.send(());
    engine_task.await.context("Engine task panicked")?;

    tracing::info!("dimmerd shutdown complete");

    Ok(())
}
