// SPDX-License-Identifier: MIT

//! `toil`: a thin client for `toild`. Every subcommand opens a connection,
//! sends one request, prints the response, and exits.

mod client;
mod output;

use clap::{Parser, Subcommand};
use client::DaemonClient;
use output::OutputFormat;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use toil_daemon::{env, protocol::Request};

#[derive(Parser)]
#[command(name = "toil", version, about = "Client for the toil background task daemon")]
struct Cli {
    /// Override the daemon's Unix socket path (defaults to $TOIL_SOCKET_PATH or the XDG runtime dir).
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Render structured responses as JSON instead of a text table.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the daemon is reachable.
    Ping,
    /// Submit a new task.
    Submit {
        /// Executor name the task runs under (e.g. "command", "llm_call", "debate", "embedding").
        task_type: String,
        /// Human-readable name; defaults to the task type.
        #[arg(long)]
        name: Option<String>,
        /// critical, high, normal, low, or background.
        #[arg(long)]
        priority: Option<String>,
        /// Executor-defined payload, given as a JSON literal (e.g. '{"command":"echo hi"}').
        #[arg(long)]
        payload: Option<String>,
        #[arg(long, default_value_t = 0)]
        max_retries: u32,
        #[arg(long, default_value_t = 0.0)]
        cpu_cores: f64,
        #[arg(long, default_value_t = 0)]
        memory_mb: u64,
    },
    /// Show a single task's full record.
    Status {
        id: String,
    },
    /// List tasks in a given status.
    List {
        /// pending, queued, running, completed, failed, cancelled, stuck, dead_letter, or paused.
        #[arg(default_value = "pending")]
        status: String,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Cancel a currently running task.
    Cancel {
        id: String,
    },
    /// Worker count and queue depth by priority.
    Stats,
    /// Ask the daemon to drain and exit.
    Shutdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let socket_path = cli.socket.unwrap_or_else(env::socket_path);
    let client = DaemonClient::new(socket_path);

    match cli.command {
        Command::Ping => {
            client.send(&Request::Ping).await?;
            println!("pong ({})", client.socket_path().display());
        }

        Command::Submit { task_type, name, priority, payload, max_retries, cpu_cores, memory_mb } => {
            let payload: JsonValue = match payload {
                Some(raw) => serde_json::from_str(&raw)?,
                None => JsonValue::Null,
            };
            let response = client
                .send(&Request::Submit {
                    task_type,
                    task_name: name,
                    priority,
                    payload,
                    max_retries,
                    required_cpu_cores: cpu_cores,
                    required_memory_mb: memory_mb,
                })
                .await?;
            if let toil_daemon::protocol::Response::Submitted { id } = response {
                println!("{id}");
            }
        }

        Command::Status { id } => {
            let response = client.send(&Request::Status { id }).await?;
            if let toil_daemon::protocol::Response::Task { task } = response {
                if cli.format == OutputFormat::Json {
                    output::print_json(&task)?;
                } else {
                    output::print_task_detail(&task);
                }
            }
        }

        Command::List { status, limit } => {
            let response = client.send(&Request::List { status, limit }).await?;
            if let toil_daemon::protocol::Response::TaskList { tasks } = response {
                if cli.format == OutputFormat::Json {
                    output::print_json(&tasks)?;
                } else {
                    output::print_task_table(&tasks);
                }
            }
        }

        Command::Cancel { id } => {
            client.send(&Request::Cancel { id: id.clone() }).await?;
            println!("cancelling {id}");
        }

        Command::Stats => {
            let response = client.send(&Request::Stats).await?;
            if let toil_daemon::protocol::Response::Stats { worker_count, pending_by_priority } = response {
                if cli.format == OutputFormat::Json {
                    output::print_json(&serde_json::json!({
                        "worker_count": worker_count,
                        "pending_by_priority": pending_by_priority,
                    }))?;
                } else {
                    println!("workers: {worker_count}");
                    for (priority, count) in pending_by_priority {
                        println!("  {priority:<10} {count}");
                    }
                }
            }
        }

        Command::Shutdown => {
            client.send(&Request::Shutdown).await?;
            println!("shutdown requested");
        }
    }

    Ok(())
}
