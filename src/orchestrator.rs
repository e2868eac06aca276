//! Orchestrator: wires the Probe Manager, Pit Controller, Motor Driver, and
//! Display Sink together and runs the process until a termination signal.

use std::sync::Arc;

use tracing::{info, warn};

use crate::display::DisplaySink;
use crate::error::Result;
use crate::motor::MotorDriver;
use crate::pit::PitController;
use crate::probe_manager::ProbeManager;
use crate::types::{OutputKind, ProbeEvent};

/// Owns every component in the control loop and wires their events.
pub struct Orchestrator<M, D> {
    probe_manager: Arc<ProbeManager>,
    controller: Arc<PitController>,
    motor: Arc<M>,
    display: Arc<D>,
}

impl<M, D> Orchestrator<M, D>
where
    M: MotorDriver + 'static,
    D: DisplaySink + 'static,
{
    /// Assemble an orchestrator from its already-constructed parts.
    pub fn new(
        probe_manager: Arc<ProbeManager>,
        controller: Arc<PitController>,
        motor: Arc<M>,
        display: Arc<D>,
    ) -> Self {
        Self {
            probe_manager,
            controller,
            motor,
            display,
        }
    }

    /// Start every subsystem and run until `shutdown` resolves, then
    /// perform ordered shutdown: fan → 0, stop/destroy the Probe Manager,
    /// return.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) -> Result<()> {
        self.probe_manager.start().await?;
        self.controller.spawn();

        let probe_events = self.probe_manager.subscribe();
        let output_events = self.controller.subscribe_output();
        let status_events = self.controller.subscribe_status();

        let controller = self.controller.clone();
        let probe_task = tokio::spawn(forward_probe_events(probe_events, controller));

        let motor = self.motor.clone();
        let reverse = self.controller.fan_reverse();
        let output_task = tokio::spawn(forward_output_events(output_events, motor, reverse));

        let display = self.display.clone();
        let status_task = tokio::spawn(forward_status_events(status_events, display));

        info!("Orchestrator running");
        shutdown.await;
        info!("Shutdown signal received, stopping");

        probe_task.abort();
        output_task.abort();
        status_task.abort();

        if let Err(e) = self.motor.set_fan(0, reverse).await {
            warn!("Failed to zero fan during shutdown: {}", e);
        }
        self.probe_manager.destroy().await?;

        info!("Orchestrator stopped");
        Ok(())
    }
}

async fn forward_probe_events(
    mut events: tokio::sync::broadcast::Receiver<ProbeEvent>,
    controller: Arc<PitController>,
) {
    loop {
        match events.recv().await {
            Ok(ProbeEvent::Update(reading)) => controller.update_probe(&reading),
            Ok(ProbeEvent::Disconnect(mac)) => controller.remove_probe(mac),
            Ok(ProbeEvent::Connect(_)) | Ok(ProbeEvent::ConnectFailed(_)) => {}
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Orchestrator dropped {} probe events (lagged)", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn forward_output_events<M: MotorDriver>(
    mut events: tokio::sync::broadcast::Receiver<crate::types::OutputEvent>,
    motor: Arc<M>,
    reversed: bool,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let result = match event.kind {
                    OutputKind::Fan => motor.set_fan(event.value, reversed).await,
                    OutputKind::Servo => motor.set_damper(event.value).await,
                };
                if let Err(e) = result {
                    warn!("Motor driver call failed: {}", e);
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Orchestrator dropped {} output events (lagged)", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn forward_status_events<D: DisplaySink>(
    mut events: tokio::sync::broadcast::Receiver<crate::types::StatusSnapshot>,
    display: Arc<D>,
) {
    loop {
        match events.recv().await {
            Ok(status) => display.update(&status).await,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!("Orchestrator dropped {} status events (lagged)", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::NullDisplaySink;
    use crate::motor::NullMotorDriver;
    use crate::types::{MacAddr, ProbeReading, TempUnit};
    use std::time::Instant;

    #[tokio::test]
    async fn test_forward_probe_events_updates_controller() {
        let (tx, rx) = tokio::sync::broadcast::channel(8);
        let controller = PitController::new(225.0, TempUnit::Fahrenheit);

        let reading = ProbeReading {
            address: MacAddr::new([0xB8, 0x1F, 0x5E, 0, 0, 1]),
            probe_index: 1,
            tip: 150.0,
            ambient: 225.0,
            unit: TempUnit::Fahrenheit,
            battery_pct: 90,
            timestamp: Instant::now(),
            firmware: "v1.0.0".into(),
        };
        tx.send(ProbeEvent::Update(reading)).unwrap();
        drop(tx);

        forward_probe_events(rx, controller.clone()).await;
        assert_eq!(controller.num_probes(), 0); // not swapped into `active` until a heavy tick
    }

    #[tokio::test]
    async fn test_orchestrator_construction() {
        // Smoke test: the generic assembly compiles and holds its parts.
        let controller = PitController::new(225.0, TempUnit::Fahrenheit);
        let motor = Arc::new(NullMotorDriver);
        let display = Arc::new(NullDisplaySink);
        // ProbeManager::new requires a real Bluetooth adapter; exercised in
        // integration contexts only, not here.
        let _ = (controller, motor, display);
    }
}
