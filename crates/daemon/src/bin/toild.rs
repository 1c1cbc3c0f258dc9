// SPDX-License-Identifier: MIT

//! The `toild` binary: a long-running process owning one `WorkerPool` over
//! one `InMemoryRepository`, serving the task protocol over a Unix socket.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use toil_daemon::{env, register_default_executors, server};
use toil_engine::{ChannelNotifier, WorkerPool};
use toil_resource::SysinfoResourceMonitor;
use toil_storage::{snapshot_store, InMemoryRepository};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let repository = Arc::new(InMemoryRepository::new());

    let snapshot_path = env::snapshot_path();
    match snapshot_store::load_snapshot(&snapshot_path) {
        Ok(Some(state)) => {
            let restored = state.tasks.len();
            repository.restore_state(state);
            tracing::info!(tasks = restored, path = %snapshot_path.display(), "restored repository snapshot");
        }
        Ok(None) => tracing::info!("no prior snapshot found, starting empty"),
        Err(err) => tracing::warn!(error = %err, "failed to load snapshot, starting empty"),
    }

    let resource_monitor = Arc::new(SysinfoResourceMonitor::new(repository.clone()));
    let (notifier, mut events) = ChannelNotifier::new(1024);
    tokio::spawn(async move {
        while let Some(envelope) = events.recv().await {
            tracing::debug!(topic = %envelope.topic, event = ?envelope.event.event_type, task_id = %envelope.event.task_id, "event");
        }
    });

    let config = env::pool_config();
    let pool = Arc::new(WorkerPool::new(repository.clone(), resource_monitor, Arc::new(notifier), config));
    register_default_executors(&pool);
    pool.start();

    let shutdown = CancellationToken::new();
    let snapshot_task = {
        let repository = repository.clone();
        let shutdown = shutdown.clone();
        let interval = env::snapshot_interval();
        let path = snapshot_path.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let state = repository.export_state();
                        if let Err(err) = snapshot_store::save_snapshot(&path, &state) {
                            tracing::warn!(error = %err, "periodic snapshot failed");
                        }
                    }
                }
            }
        })
    };

    let socket_path = env::socket_path();
    let serve_result = server::run(pool.clone(), &socket_path, shutdown.clone()).await;
    if let Err(err) = &serve_result {
        tracing::error!(error = %err, "socket server exited with an error");
    }

    shutdown.cancel();
    let _ = snapshot_task.await;

    let drain = env::drain_timeout(pool.config());
    pool.stop(drain).await;

    if let Err(err) = snapshot_store::save_snapshot(&snapshot_path, &repository.export_state()) {
        tracing::warn!(error = %err, "final snapshot failed");
    }

    serve_result
}
