// SPDX-License-Identifier: MIT

//! Thin Unix-socket client: one `Request` per line out, one `Response` per
//! line back. No connection pooling or retries — each command opens a
//! fresh connection and closes it when done.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use toil_daemon::protocol::{Request, Response};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not reach daemon at {path}: {source}")]
    Connect { path: PathBuf, source: std::io::Error },

    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    #[error("daemon closed the connection without a response")]
    NoResponse,

    #[error("malformed response from daemon: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{0}")]
    Daemon(String),
}

pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self { socket_path: socket_path.into() }
    }

    pub async fn send(&self, request: &Request) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| ClientError::Connect { path: self.socket_path.clone(), source })?;
        let (read_half, mut write_half) = stream.into_split();

        let mut encoded = serde_json::to_string(request)?;
        encoded.push('\n');
        write_half.write_all(encoded.as_bytes()).await?;
        write_half.shutdown().await?;

        let mut line = String::new();
        let read = BufReader::new(read_half).read_line(&mut line).await?;
        if read == 0 {
            return Err(ClientError::NoResponse);
        }
        let response: Response = serde_json::from_str(line.trim_end())?;
        if let Response::Error { message } = response {
            return Err(ClientError::Daemon(message));
        }
        Ok(response)
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}
