//! Host telemetry shown next to the log.
//!
//! A [`SensorSource`] produces a [`SensorReport`] once per request. Sources
//! never fail: when readings are unavailable the report carries a
//! human-readable explanation instead, because the page must still render.

pub mod command;
pub mod system;

pub use command::CommandSensor;
pub use system::SystemSensor;

use crate::config::ServerConfig;
use async_trait::async_trait;
use std::sync::Arc;

/// Report text used when a source produced no readings.
pub const NO_DATA: &str = "No temperature data available.";
/// Report text used when the external command could not be started.
pub const SPAWN_FAILED: &str = "Error: Unable to fetch temperatures.";
/// Report text used when the external command exited unsuccessfully.
pub const COMMAND_FAILED: &str = "Error: Sensors command failed.";
/// Report text used when the external command ran past its timeout.
pub const COMMAND_TIMED_OUT: &str = "Error: Sensors command timed out.";

/// An opaque, multi-line telemetry text captured for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReport {
    text: String,
}

impl SensorReport {
    /// Wrap raw readings. Blank output becomes the [`NO_DATA`] fallback.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            Self::fallback(NO_DATA)
        } else {
            Self { text }
        }
    }

    pub fn fallback(message: &str) -> Self {
        Self {
            text: message.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

/// Capability interface for telemetry providers.
///
/// `sample` may block for as long as the underlying source takes; callers
/// run it inside the connection handler.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Take one reading.
    async fn sample(&self) -> SensorReport;

    /// Short name used in log messages.
    fn name(&self) -> &str;
}

/// A source that always reports the same text. Useful when the host has no
/// sensors worth querying, and in tests.
#[derive(Debug, Clone)]
pub struct StaticSensor {
    report: SensorReport,
}

impl StaticSensor {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            report: SensorReport::new(text),
        }
    }
}

#[async_trait]
impl SensorSource for StaticSensor {
    async fn sample(&self) -> SensorReport {
        self.report.clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Build the sensor source named by the configuration: the external command
/// when one is set, native readings otherwise.
pub fn from_config(config: &ServerConfig) -> Arc<dyn SensorSource> {
    match &config.sensor_command {
        Some(command) => Arc::new(CommandSensor::from_command_line(
            command,
            config.sensor_timeout(),
        )),
        None => Arc::new(SystemSensor::new()),
    }
}
