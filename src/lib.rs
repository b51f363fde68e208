//! # logview - a minimal log viewer
//!
//! One side appends text lines to a log file (from command-line arguments,
//! interactive stdin, or a TCP socket). The other side serves an
//! auto-refreshing HTML page showing that file, newest line first by
//! default, together with a snapshot of the host's temperature sensors.
//!
//! The page server never parses requests: every connection gets the same
//! freshly rendered page, after which the connection is closed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use logview::{sensors, ConnectionServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default().with_log_path("/var/log/app.txt");
//!     let server = ConnectionServer::bind(&config, sensors::from_config(&config)).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod log;
pub mod sensors;
pub mod web;

// Re-export public API
pub use config::ServerConfig;
pub use error::{Result, ViewerError};
pub use lifecycle::{shutdown_signal, InstanceMarker};
pub use log::{LineStore, LogLines, LogWriter, RemoteLogger};
pub use sensors::{CommandSensor, SensorReport, SensorSource, StaticSensor, SystemSensor};
pub use web::{render_page, ConnectionServer, PageOptions, PageService, RenderedPage, Status};

/// The default page server port
pub const DEFAULT_PORT: u16 = 28885;

/// The default port of the line logger socket
pub const DEFAULT_REMOTE_PORT: u16 = 28886;

/// The default client refresh interval in seconds
pub const DEFAULT_REFRESH_SECS: u32 = 5;

/// The default external sensor command
pub const DEFAULT_SENSOR_COMMAND: &str = "sensors";

/// The default log file
pub const DEFAULT_LOG_FILE: &str = "log.txt";
