// SPDX-License-Identifier: MIT

//! Plain-text and JSON rendering of daemon responses.

use clap::ValueEnum;
use serde::Serialize;
use toil_core::Task;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_task_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("no tasks");
        return;
    }
    println!("{:<14} {:<10} {:<10} {:<9} {:>6}  {}", "ID", "STATUS", "PRIORITY", "RETRIES", "PROG%", "NAME");
    for task in tasks {
        println!(
            "{:<14} {:<10} {:<10} {:<9} {:>6.1}  {}",
            task.id,
            task.status,
            task.priority,
            format!("{}/{}", task.retry_count, task.max_retries),
            task.progress,
            task.task_name,
        );
    }
}

pub fn print_task_detail(task: &Task) {
    println!("id:              {}", task.id);
    println!("type:            {}", task.task_type);
    println!("name:            {}", task.task_name);
    println!("status:          {}", task.status);
    println!("priority:        {}", task.priority);
    println!("progress:        {:.1}%", task.progress);
    if let Some(message) = &task.progress_message {
        println!("progress msg:    {message}");
    }
    println!("retries:         {}/{}", task.retry_count, task.max_retries);
    if let Some(worker) = &task.worker_id {
        println!("worker:          {worker}");
    }
    if let Some(error) = &task.last_error {
        println!("last error:      {error}");
    }
    if let Some(output) = &task.output {
        println!("output:          {output}");
    }
}
