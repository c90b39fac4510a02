use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::{mpsc, oneshot},
};

use crate::{
    blocklist::BlockSet, coordinator::StatusReport, schedule::WeeklySchedule, settings::Settings,
};

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum IpcRequest {
    Status,
    Lock,
    Unlock,
    GetSettings,
    UpdateSchedule(WeeklySchedule),
    UpdateBlockSet(BlockSet),
    SetWarningMinutes(u32),
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum IpcResponse {
    Status(StatusReport),
    Settings(Settings),
    Ok,
    Error(String),
    Shutdown,
}

/// A request waiting for the control loop to answer it
#[derive(Debug)]
pub struct PendingRequest {
    pub request: IpcRequest,
    pub reply: oneshot::Sender<IpcResponse>,
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the daemon cannot be reached or answers with
    /// something undecodable.
    pub async fn send_command(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;

        let encoded = bincode::serialize(&request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: IpcResponse = bincode::deserialize(&buffer)?;

        Ok(response)
    }
}

async fn serve(mut stream: UnixStream, requests: mpsc::UnboundedSender<PendingRequest>) -> Result<()> {
    // Clients close their write half after the request
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    if buf.is_empty() {
        return Ok(());
    }
    let request: IpcRequest = bincode::deserialize(&buf)?;
    log::debug!("IPC request: {request:?}");

    let (reply, answer) = oneshot::channel();
    requests
        .send(PendingRequest { request, reply })
        .map_err(|_| anyhow::anyhow!("daemon is shutting down"))?;
    let response = answer
        .await
        .unwrap_or_else(|_| IpcResponse::Error("daemon is shutting down".to_string()));

    let encoded = bincode::serialize(&response)?;
    stream.write_all(&encoded).await?;
    Ok(())
}

/// Accept connections on `sock_path` and forward each request to
/// `requests`. Runs until the receiving side goes away.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound.
pub async fn listen(requests: mpsc::UnboundedSender<PendingRequest>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    while !requests.is_closed() {
        match listener.accept().await {
            Ok((stream, _)) => {
                let requests = requests.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, requests).await {
                        log::error!("IPC connection error: {e}");
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
    Ok(())
}
