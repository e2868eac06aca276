//! Display Sink: the status-rendering boundary.

use async_trait::async_trait;
use tracing::info;

use crate::types::StatusSnapshot;

/// Hardware/UI boundary that renders controller status. A real
/// implementation (framebuffer, touchscreen UI) is out of scope; see
/// `demos/monitor.rs` for a terminal renderer built on this trait.
#[async_trait]
pub trait DisplaySink: Send + Sync {
    /// Render a fresh snapshot. Called once per heavy tick, after `fan`
    /// and `servo` have both been committed.
    async fn update(&self, status: &StatusSnapshot);
}

/// A `DisplaySink` that discards every snapshot.
#[derive(Debug, Default)]
pub struct NullDisplaySink;

#[async_trait]
impl DisplaySink for NullDisplaySink {
    async fn update(&self, _status: &StatusSnapshot) {}
}

/// A `DisplaySink` that logs one line per snapshot; useful for headless
/// operation.
#[derive(Debug, Default)]
pub struct LoggingDisplaySink;

#[async_trait]
impl DisplaySink for LoggingDisplaySink {
    async fn update(&self, status: &StatusSnapshot) {
        info!(
            mode = %status.mode,
            num_probes = status.num_probes,
            pit_temp = ?status.pit_temp,
            set_point = status.set_point,
            unit = %status.unit,
            pid_output = status.pid_output,
            fan_pct = status.fan_pct,
            servo_pct = status.servo_pct_0_100,
            "status"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pit::Mode;

    fn sample_status() -> StatusSnapshot {
        StatusSnapshot {
            mode: Mode::Normal,
            num_probes: 1,
            pit_temp: Some(225.0),
            set_point: 225.0,
            unit: crate::types::TempUnit::Fahrenheit,
            pid_output: 12.0,
            fan_pct: 12,
            servo_pct_0_100: 40,
        }
    }

    #[tokio::test]
    async fn test_null_sink_accepts_updates() {
        let sink = NullDisplaySink;
        sink.update(&sample_status()).await;
    }

    #[tokio::test]
    async fn test_logging_sink_accepts_updates() {
        let sink = LoggingDisplaySink;
        sink.update(&sample_status()).await;
    }
}
