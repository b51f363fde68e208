//! Line logger over TCP.
//!
//! Each connection delivers one message: the listener reads once, up to a
//! fixed buffer, appends what it got as a single log line and closes.

use super::writer::LogWriter;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::web::bind_listener;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and appends each payload to the log file.
pub struct RemoteLogger {
    listener: TcpListener,
    writer: Arc<LogWriter>,
    read_buffer_size: usize,
    read_timeout: Duration,
    limit: Arc<Semaphore>,
}

impl RemoteLogger {
    /// Bind the remote logger port described by `config`.
    pub async fn bind(config: &ServerConfig) -> Result<Self> {
        config.validate()?;
        let listener = bind_listener(config.remote_socket_addr()?)?;

        Ok(Self {
            listener,
            writer: Arc::new(LogWriter::new(&config.log_path)),
            read_buffer_size: config.read_buffer_size,
            read_timeout: config.read_timeout(),
            limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept messages until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Accepting log lines on {}", self.local_addr()?);

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.limit.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept log connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            let writer = Arc::clone(&self.writer);
            let size = self.read_buffer_size;
            let timeout = self.read_timeout;
            tokio::spawn(async move {
                let _permit = permit;
                match receive_line(stream, &writer, size, timeout).await {
                    Ok(true) => debug!("Logged line from {}", peer),
                    Ok(false) => debug!("Empty message from {}", peer),
                    Err(e) => warn!("Failed to log message from {}: {}", peer, e),
                }
            });
        }

        info!("Stopped accepting log lines");
        Ok(())
    }
}

/// Read one message and append it. Returns whether a line was written.
///
/// The stream is dropped, and so closed, when this returns.
pub async fn receive_line<S>(
    mut stream: S,
    writer: &LogWriter,
    read_buffer_size: usize,
    read_timeout: Duration,
) -> Result<bool>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; read_buffer_size];
    let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(read) => read?,
        Err(_) => 0,
    };

    let message = String::from_utf8_lossy(&buf[..n]);
    let message = message.trim_end_matches(['\r', '\n']);
    if message.is_empty() {
        return Ok(false);
    }

    writer.append(message).await?;
    Ok(true)
}
