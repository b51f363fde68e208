//! Native temperature readings through sysinfo.

use super::{SensorReport, SensorSource, NO_DATA};
use async_trait::async_trait;
use sysinfo::Components;
use tracing::warn;

/// Reads hardware temperature components directly, without an external tool.
#[derive(Debug, Clone, Default)]
pub struct SystemSensor;

impl SystemSensor {
    pub fn new() -> Self {
        Self
    }

    /// Take one blocking reading of every temperature component.
    pub fn read_components() -> String {
        let components = Components::new_with_refreshed_list();
        let readings: Vec<Reading> = components
            .iter()
            .map(|component| Reading {
                label: component.label().to_string(),
                celsius: component.temperature(),
                critical: component.critical(),
            })
            .collect();
        format_readings(&readings)
    }
}

#[derive(Debug, Clone)]
struct Reading {
    label: String,
    celsius: f32,
    critical: Option<f32>,
}

fn format_readings(readings: &[Reading]) -> String {
    readings
        .iter()
        .filter(|r| r.celsius.is_finite())
        .map(|r| match r.critical.filter(|c| c.is_finite()) {
            Some(crit) => format!("{}: {:+.1}°C (crit = {:+.1}°C)\n", r.label, r.celsius, crit),
            None => format!("{}: {:+.1}°C\n", r.label, r.celsius),
        })
        .collect()
}

#[async_trait]
impl SensorSource for SystemSensor {
    async fn sample(&self) -> SensorReport {
        match tokio::task::spawn_blocking(Self::read_components).await {
            Ok(text) => SensorReport::new(text),
            Err(e) => {
                warn!("Native sensor reading failed: {}", e);
                SensorReport::fallback(NO_DATA)
            }
        }
    }

    fn name(&self) -> &str {
        "native"
    }
}
