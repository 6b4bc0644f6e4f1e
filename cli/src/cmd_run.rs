//! `chainwatch run`: wire the providers, queues, pipeline and connection.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use chainwatch_core::{Deduplicator, DeliveryQueue, EntityStore, MemoryStore, Pipeline, WatchConfig};
use chainwatch_providers::{SheetsStore, SolanaTxExtractor, WebhookSink};
use chainwatch_ws::{route_frames, ConnectionExit, ConnectionManager};

use crate::logging;

pub async fn run(path: &Path, verbose: bool) -> Result<ExitCode> {
    let config = WatchConfig::from_file(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    logging::init_tracing(&config.log, verbose);

    info!(
        ws_url = %config.ws_url,
        rpc_url = %config.rpc_url,
        subscriptions = config.subscriptions.len(),
        sinks = config.sinks.len(),
        "starting chainwatch {}",
        env!("CARGO_PKG_VERSION")
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let extractor = Arc::new(
        SolanaTxExtractor::new(&config.rpc_url, &config.extractor).context("failed to build extractor")?,
    );
    let mut pipeline = Pipeline::new(extractor, Arc::new(Deduplicator::new()));

    let mut queues = Vec::with_capacity(config.sinks.len());
    for sink_config in &config.sinks {
        let sink = Arc::new(
            WebhookSink::new(&sink_config.name, &sink_config.webhook_url)
                .with_context(|| format!("failed to build sink {}", sink_config.name))?,
        );
        let (queue, handle) = DeliveryQueue::new(sink, sink_config.queue.clone(), shutdown_rx.clone());
        queues.push((sink_config.name.clone(), queue.spawn()));
        pipeline = pipeline.with_queue(handle);
    }

    let store: Arc<dyn EntityStore> = match &config.sheets {
        Some(sheets) => Arc::new(SheetsStore::new(sheets).context("failed to build sheets store")?),
        None => {
            info!("no spreadsheet configured, discoveries are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    let pipeline = Arc::new(pipeline.with_store(store));

    let (manager, frames) = ConnectionManager::new(
        config.ws_url.clone(),
        config.subscriptions.clone(),
        config.connection.clone(),
        shutdown_rx,
    );
    let router = tokio::spawn(route_frames(frames, Arc::clone(&pipeline)));
    let mut connection = tokio::spawn(manager.run());

    let exit = tokio::select! {
        exit = &mut connection => exit.context("connection task failed")?,
        _ = shutdown_signal() => {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            connection.await.context("connection task failed")?
        }
    };

    // Stops the queues when the connection ended on its own.
    let _ = shutdown_tx.send(true);

    let routed = router.await.context("frame router failed")?;
    for (name, task) in queues {
        match task.await {
            Ok(stats) => info!(
                sink = %name,
                delivered = stats.delivered,
                retried = stats.retried,
                dropped = stats.dropped,
                abandoned = stats.abandoned,
                "sink queue stopped"
            ),
            Err(e) => warn!(sink = %name, error = %e, "sink queue task failed"),
        }
    }

    let stats = pipeline.stats();
    info!(
        frames = routed.frames,
        notifications = stats.notifications,
        new_entities = stats.new_entities,
        duplicates = stats.duplicates,
        extraction_failures = stats.extraction_failures,
        "chainwatch stopped"
    );

    match exit {
        ConnectionExit::Shutdown => Ok(ExitCode::SUCCESS),
        ConnectionExit::Fatal { attempts } => {
            error!(attempts, "connection could not be re-established, exiting");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
