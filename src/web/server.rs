//! The connection server: accept loop plus per-connection page handler.
//!
//! Every accepted connection is handed to its own detached task. The task
//! reads whatever the client sent (up to a fixed buffer, never parsed),
//! renders the page from the current log file and sensor reading, writes it
//! and closes. A semaphore caps how many handlers run at once; while it is
//! exhausted the loop stops accepting and new clients wait in the backlog.

use super::page::{render_page, PageOptions, RenderedPage, Status};
use crate::config::ServerConfig;
use crate::error::{Result, ViewerError};
use crate::log::LineStore;
use crate::sensors::SensorSource;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Pending-connection queue length passed to `listen`.
pub const LISTEN_BACKLOG: u32 = 64;

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind a listening TCP socket with address reuse enabled, so a restart is
/// not blocked by sockets of a previous instance still in TIME_WAIT. Port
/// reuse stays off: a second live listener on the same port is refused.
pub fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let bind_err = |e| ViewerError::bind_error(addr.to_string(), e);

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_err)?;

    socket.set_reuseaddr(true).map_err(bind_err)?;

    socket.bind(addr).map_err(bind_err)?;
    socket.listen(LISTEN_BACKLOG).map_err(bind_err)
}

/// Everything a handler needs to produce a page.
pub struct PageService {
    store: LineStore,
    sensor: Arc<dyn SensorSource>,
    options: PageOptions,
    read_buffer_size: usize,
    read_timeout: Duration,
}

impl PageService {
    pub fn new(config: &ServerConfig, sensor: Arc<dyn SensorSource>) -> Self {
        Self {
            store: LineStore::new(&config.log_path),
            sensor,
            options: PageOptions::from(config),
            read_buffer_size: config.read_buffer_size,
            read_timeout: config.read_timeout(),
        }
    }

    /// Read the log and the sensors and render the page.
    pub async fn render(&self) -> RenderedPage {
        let (log, report) = tokio::join!(self.store.read_lines(), self.sensor.sample());
        if let Err(e) = &log {
            warn!("{}", e);
        }
        render_page(&log, &report, &self.options)
    }

    /// Serve one connection: drain the request, write the page, close.
    ///
    /// Read problems are ignored since the response does not depend on the
    /// request. Only a failed write is reported.
    pub async fn handle_connection<S>(&self, mut stream: S) -> Result<Status>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; self.read_buffer_size];
        match tokio::time::timeout(self.read_timeout, stream.read(&mut buf)).await {
            Ok(Ok(n)) => debug!("Discarded {} request bytes", n),
            Ok(Err(e)) => debug!("Client read failed: {}", e),
            Err(_) => debug!("No request bytes within {:?}", self.read_timeout),
        }

        let page = self.render().await;
        stream
            .write_all(page.as_bytes())
            .await
            .map_err(ViewerError::ClientWrite)?;
        stream.shutdown().await.map_err(ViewerError::ClientWrite)?;

        Ok(page.status())
    }
}

/// Owns the listening socket and dispatches connections.
pub struct ConnectionServer {
    listener: TcpListener,
    service: Arc<PageService>,
    limit: Arc<Semaphore>,
}

impl ConnectionServer {
    /// Bind the listening socket described by `config`.
    ///
    /// Fails with [`ViewerError::Bind`] when the socket cannot be set up;
    /// that is the only fatal server error.
    pub async fn bind(config: &ServerConfig, sensor: Arc<dyn SensorSource>) -> Result<Self> {
        config.validate()?;
        let listener = bind_listener(config.socket_addr()?)?;

        Ok(Self {
            listener,
            service: Arc::new(PageService::new(config, sensor)),
            limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Accept connections until `shutdown` resolves. Handlers already running
    /// finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Serving log page on http://{}", self.local_addr()?);

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
                        error!("{}", ViewerError::Accept(e));
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            debug!("Accepted connection from {}", peer);
            let service = Arc::clone(&self.service);
            tokio::spawn(async move {
                let _permit = permit;
                match service.handle_connection(stream).await {
                    Ok(status) => debug!("Answered {} with {}", peer, status.code()),
                    Err(e) => debug!("Dropped {}: {}", peer, e),
                }
            });
        }

        info!("Stopped accepting connections");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::StaticSensor;
    use std::io::Write;

    fn service_for(path: &std::path::Path) -> PageService {
        let config = ServerConfig::new("127.0.0.1", 0).with_log_path(path);
        PageService::new(&config, Arc::new(StaticSensor::new("cpu: +40.0°C")))
    }

    #[tokio::test]
    async fn test_handler_writes_full_page() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"start\nmid\nend\n").unwrap();
        let service = service_for(file.path());

        let expected = service.render().await;
        let stream = tokio_test::io::Builder::new()
            .read(b"GET /anything HTTP/1.1\r\n\r\n")
            .write(expected.as_bytes())
            .build();

        let status = service.handle_connection(stream).await.unwrap();
        assert_eq!(status, Status::Ok);
    }

    #[tokio::test]
    async fn test_handler_ignores_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_for(&dir.path().join("missing.txt"));

        let expected = service.render().await;
        let stream = tokio_test::io::Builder::new()
            .read_error(std::io::Error::from(std::io::ErrorKind::ConnectionReset))
            .write(expected.as_bytes())
            .build();

        let status = service.handle_connection(stream).await.unwrap();
        assert_eq!(status, Status::InternalServerError);
    }

    #[tokio::test]
    async fn test_handler_reports_write_failure() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_for(&dir.path().join("log.txt"));

        let stream = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r\n\r\n")
            .write_error(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            .build();

        let err = service.handle_connection(stream).await.unwrap_err();
        assert!(matches!(err, ViewerError::ClientWrite(_)));
    }

    #[tokio::test]
    async fn test_second_bind_on_same_port_is_refused() {
        let config = ServerConfig::new("127.0.0.1", 0);
        let first = ConnectionServer::bind(&config, Arc::new(StaticSensor::new("x")))
            .await
            .unwrap();
        let port = first.local_addr().unwrap().port();

        let config = ServerConfig::new("127.0.0.1", port);
        let second = ConnectionServer::bind(&config, Arc::new(StaticSensor::new("x"))).await;
        assert!(matches!(second, Err(ViewerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_bind_conflict_with_foreign_listener() {
        let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let config = ServerConfig::new("127.0.0.1", port);
        let result = ConnectionServer::bind(&config, Arc::new(StaticSensor::new("x"))).await;
        assert!(matches!(result, Err(ViewerError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_bind_rejects_invalid_config() {
        let config = ServerConfig::new("127.0.0.1", 0).with_refresh_interval(0);
        let result = ConnectionServer::bind(&config, Arc::new(StaticSensor::new("x"))).await;
        assert!(matches!(result, Err(ViewerError::Config(_))));
    }
}
