//! Telemetry from an external diagnostic command such as `sensors`.

use super::{SensorReport, SensorSource, COMMAND_FAILED, COMMAND_TIMED_OUT, SPAWN_FAILED};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// Runs a command and reports its standard output verbatim.
#[derive(Debug, Clone)]
pub struct CommandSensor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandSensor {
    /// Run `program` with `args`, killing it after `timeout`.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Build from a whitespace-separated command line, e.g. `"sensors -A"`.
    pub fn from_command_line(command_line: &str, timeout: Duration) -> Self {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        Self::new(program, parts.collect(), timeout)
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

#[async_trait]
impl SensorSource for CommandSensor {
    async fn sample(&self) -> SensorReport {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!("Failed to run sensor command {}: {}", self.program, e);
                return SensorReport::fallback(SPAWN_FAILED);
            }
            Err(_) => {
                warn!(
                    "Sensor command {} did not finish within {:?}",
                    self.program, self.timeout
                );
                return SensorReport::fallback(COMMAND_TIMED_OUT);
            }
        };

        if !output.status.success() {
            warn!("Sensor command {} exited with {}", self.program, output.status);
            return SensorReport::fallback(COMMAND_FAILED);
        }

        SensorReport::new(String::from_utf8_lossy(&output.stdout))
    }

    fn name(&self) -> &str {
        &self.program
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::sensors::NO_DATA;

    fn sensor(command_line: &str) -> CommandSensor {
        CommandSensor::from_command_line(command_line, Duration::from_secs(5))
    }

    #[test]
    fn test_command_line_parsing() {
        let sensor = sensor("sensors -A -u");
        assert_eq!(sensor.program(), "sensors");
        assert_eq!(sensor.args, vec!["-A", "-u"]);
    }

    #[tokio::test]
    async fn test_successful_command() {
        let report = sensor("echo Core 0: +42.0°C").sample().await;
        assert_eq!(report.text(), "Core 0: +42.0°C\n");
    }

    #[tokio::test]
    async fn test_missing_command() {
        let report = sensor("definitely-not-a-real-sensor-tool").sample().await;
        assert_eq!(report.text(), SPAWN_FAILED);
    }

    #[tokio::test]
    async fn test_failing_command() {
        let report = sensor("false").sample().await;
        assert_eq!(report.text(), COMMAND_FAILED);
    }

    #[tokio::test]
    async fn test_empty_output() {
        let report = sensor("true").sample().await;
        assert_eq!(report.text(), NO_DATA);
    }

    #[tokio::test]
    async fn test_timeout() {
        let sensor = CommandSensor::from_command_line("sleep 10", Duration::from_millis(100));
        let report = sensor.sample().await;
        assert_eq!(report.text(), COMMAND_TIMED_OUT);
    }
}
