// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Socket client for talking to fleetd.

use anyhow::{Context as _, Result};
use fleet_daemon::protocol::wire::{self, DEFAULT_TIMEOUT};
use fleet_daemon::protocol::{Request, Response};
use std::path::PathBuf;
use tokio::net::UnixStream;

use crate::exit_error::CliError;

/// One connection to the daemon socket.
pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    /// Resolve the socket path from the daemon's own configuration rules.
    pub fn socket_path() -> Result<PathBuf> {
        let config = fleet_daemon::Config::load().context("resolving state directory")?;
        Ok(config.socket_path)
    }

    /// Connect, mapping a missing daemon to an unhealthy-subsystem error.
    pub async fn connect() -> Result<Self, CliError> {
        let path = Self::socket_path().map_err(CliError::from)?;
        let stream = UnixStream::connect(&path).await.map_err(|_| {
            CliError::unhealthy(format!(
                "daemon is not running (no socket at {}); run `fleet start`",
                path.display()
            ))
        })?;
        Ok(Self { stream })
    }

    /// Send one request and read one response.
    pub async fn request(&mut self, request: &Request) -> Result<Response, CliError> {
        let data = wire::encode(request)
            .map_err(|e| CliError::caller(format!("encoding request: {}", e)))?;
        wire::write_message(&mut self.stream, &data)
            .await
            .map_err(|e| CliError::unhealthy(format!("daemon connection lost: {}", e)))?;

        let bytes = wire::read_message(&mut self.stream)
            .await
            .map_err(|e| CliError::unhealthy(format!("daemon connection lost: {}", e)))?;
        wire::decode(&bytes).map_err(|e| CliError::unhealthy(format!("bad response: {}", e)))
    }

    /// Send one request with the default IPC timeout.
    pub async fn request_with_timeout(&mut self, request: &Request) -> Result<Response, CliError> {
        tokio::time::timeout(DEFAULT_TIMEOUT, self.request(request))
            .await
            .map_err(|_| CliError::unhealthy("daemon did not answer in time"))?
    }

    /// Write pre-encoded bytes without awaiting a response (streaming mode).
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), CliError> {
        wire::write_message(&mut self.stream, data)
            .await
            .map_err(|e| CliError::unhealthy(format!("daemon connection lost: {}", e)))
    }

    /// Read the next streamed frame (EventsSubscribe).
    pub async fn next_frame(&mut self) -> Result<Response, CliError> {
        let bytes = wire::read_message(&mut self.stream)
            .await
            .map_err(|e| CliError::unhealthy(format!("event stream ended: {}", e)))?;
        wire::decode(&bytes).map_err(|e| CliError::unhealthy(format!("bad frame: {}", e)))
    }
}

/// Map the daemon's error-shaped responses onto CLI errors.
pub fn expect_ok(response: Response) -> Result<Response, CliError> {
    match response {
        Response::Error { message } => Err(CliError::caller(message)),
        Response::NotFound { message } => Err(CliError::not_found(message)),
        other => Ok(other),
    }
}
