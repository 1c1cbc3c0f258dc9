// SPDX-License-Identifier: MIT

//! Unix-socket front end: accepts connections, reads one newline-delimited
//! JSON `Request` per line, dispatches it against the pool, and writes back
//! one newline-delimited JSON `Response`.

use crate::protocol::{Request, Response};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use toil_core::{Priority, TaskConfig, TaskId, TaskStatus};
use toil_engine::WorkerPool;
use toil_resource::ResourceMonitor;
use toil_storage::Repository;

pub async fn run<R, M>(pool: Arc<WorkerPool<R, M>>, socket_path: &Path, shutdown: CancellationToken) -> std::io::Result<()>
where
    R: Repository,
    M: ResourceMonitor,
{
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "listening on unix socket");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let pool = pool.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(err) = handle_connection(stream, pool, shutdown).await {
                                tracing::warn!(error = %err, "connection handler failed");
                            }
                        });
                    }
                    Err(err) => tracing::warn!(error = %err, "accept failed"),
                }
            }
        }
    }

    let _ = std::fs::remove_file(socket_path);
    Ok(())
}

async fn handle_connection<R, M>(stream: UnixStream, pool: Arc<WorkerPool<R, M>>, shutdown: CancellationToken) -> std::io::Result<()>
where
    R: Repository,
    M: ResourceMonitor,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let is_shutdown = matches!(request, Request::Shutdown);
                let response = dispatch(&pool, request).await;
                if is_shutdown {
                    shutdown.cancel();
                }
                response
            }
            Err(err) => Response::error(format!("invalid request: {err}")),
        };
        let mut encoded = serde_json::to_string(&response).unwrap_or_else(|_| "{\"type\":\"Error\"}".to_string());
        encoded.push('\n');
        write_half.write_all(encoded.as_bytes()).await?;
    }
    Ok(())
}

async fn dispatch<R, M>(pool: &Arc<WorkerPool<R, M>>, request: Request) -> Response
where
    R: Repository,
    M: ResourceMonitor,
{
    match request {
        Request::Ping => Response::Pong,

        Request::Submit { task_type, task_name, priority, payload, max_retries, required_cpu_cores, required_memory_mb } => {
            let mut config = TaskConfig::new(task_type).payload(payload).max_retries(max_retries).required_cpu_cores(required_cpu_cores).required_memory_mb(required_memory_mb);
            if let Some(name) = task_name {
                config = config.task_name(name);
            }
            if let Some(priority) = priority {
                match priority.parse::<Priority>() {
                    Ok(p) => config = config.priority(p),
                    Err(e) => return Response::error(e.to_string()),
                }
            }
            match pool.queue().enqueue(config).await {
                Ok(task) => Response::Submitted { id: task.id.as_str().to_string() },
                Err(e) => Response::error(e.to_string()),
            }
        }

        Request::Status { id } => match pool.repository().get_by_id(&TaskId::from_string(&id)).await {
            Ok(Some(task)) => Response::Task { task: Box::new(task) },
            Ok(None) => Response::error(format!("no such task: {id}")),
            Err(e) => Response::error(e.to_string()),
        },

        Request::List { status, limit } => match status.parse::<TaskStatus>() {
            Ok(status) => match pool.repository().get_by_status(status, limit.max(1), 0).await {
                Ok(tasks) => Response::TaskList { tasks },
                Err(e) => Response::error(e.to_string()),
            },
            Err(e) => Response::error(e.to_string()),
        },

        Request::Cancel { id } => {
            let task_id = TaskId::from_string(&id);
            if pool.cancel_task(&task_id) {
                Response::Cancelled { id }
            } else {
                Response::error(format!("task {id} is not currently running"))
            }
        }

        Request::Stats => match pool.queue().depth_by_priority().await {
            Ok(depth) => {
                let pending_by_priority = depth.into_iter().map(|(p, n)| (p.to_string(), n)).collect();
                Response::Stats { worker_count: pool.worker_count(), pending_by_priority }
            }
            Err(e) => Response::error(e.to_string()),
        },

        Request::Shutdown => Response::ShuttingDown,
    }
}
