//! Supervisory state machine for discovering and maintaining connections to
//! eligible BLE probes.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::scanner::BleScanner;
use crate::error::Result;
use crate::probe::Probe;
use crate::types::{MacAddr, ProbeEvent, TempUnit};

/// Supervisory tick cadence.
pub const SUPERVISORY_TICK: Duration = Duration::from_secs(1);
/// Consecutive connect failures before the manager schedules a restart.
pub const MAX_CONNECTION_FAILURES: u32 = 10;

/// Discovers, connects, and supervises every eligible probe.
pub struct ProbeManager {
    scanner: Arc<BleScanner>,
    probes: Arc<RwLock<HashMap<MacAddr, Arc<Probe>>>>,
    blacklist: Arc<RwLock<HashSet<MacAddr>>>,
    unit: RwLock<TempUnit>,
    is_running: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ProbeEvent>,
    supervisory_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ProbeManager {
    /// Create a new manager bound to the default Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(unit: TempUnit) -> Result<Self> {
        let scanner = BleScanner::new().await?;
        let (event_tx, _) = broadcast::channel(256);

        Ok(Self {
            scanner: Arc::new(scanner),
            probes: Arc::new(RwLock::new(HashMap::new())),
            blacklist: Arc::new(RwLock::new(HashSet::new())),
            unit: RwLock::new(unit),
            is_running: Arc::new(AtomicBool::new(false)),
            event_tx,
            supervisory_handle: RwLock::new(None),
        })
    }

    /// Acquire the adapter, begin discovery, and start the supervisory tick.
    pub async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::SeqCst) {
            debug!("Probe manager already running");
            return Ok(());
        }

        info!("Starting probe manager");

        self.scanner.start_scanning().await?;
        self.is_running.store(true, Ordering::SeqCst);

        let scanner = self.scanner.clone();
        let probes = self.probes.clone();
        let blacklist = self.blacklist.clone();
        let is_running = self.is_running.clone();
        let event_tx = self.event_tx.clone();
        let unit = *self.unit.read();

        let connect_failures = Arc::new(AtomicU32::new(0));

        let handle = {
            let connect_failures = connect_failures.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SUPERVISORY_TICK);

                while is_running.load(Ordering::SeqCst) {
                    ticker.tick().await;

                    Self::supervisory_tick(
                        &scanner,
                        &probes,
                        &blacklist,
                        &event_tx,
                        unit,
                        &connect_failures,
                    )
                    .await;

                    if connect_failures.load(Ordering::SeqCst) > MAX_CONNECTION_FAILURES {
                        warn!(
                            "Connect failure count exceeded {}, scheduling restart",
                            MAX_CONNECTION_FAILURES
                        );
                        connect_failures.store(0, Ordering::SeqCst);
                        // One tick's grace before the actual restart, so any
                        // in-flight connect attempts have a chance to resolve.
                        ticker.tick().await;
                        if let Err(e) = scanner.stop_scanning().await {
                            warn!("Restart: failed to stop scan: {}", e);
                        }
                        if let Err(e) = scanner.start_scanning().await {
                            warn!("Restart: failed to resume scan: {}", e);
                        }
                    }
                }

                debug!("Probe manager supervisory loop ended");
            })
        };

        *self.supervisory_handle.write() = Some(handle);

        Ok(())
    }

    /// Halt discovery. Already-connected probes continue until they
    /// disconnect naturally.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!("Stopping probe manager");

        self.is_running.store(false, Ordering::SeqCst);
        self.scanner.stop_scanning().await?;

        if let Some(handle) = self.supervisory_handle.write().take() {
            let _ = handle.await;
        }

        Ok(())
    }

    /// `stop()` then `start()` after one tick; the in-memory probe map is
    /// preserved across the restart.
    pub async fn restart(&self) -> Result<()> {
        self.stop().await?;
        tokio::time::sleep(SUPERVISORY_TICK).await;
        self.start().await
    }

    /// Add a MAC to the blacklist; it is skipped on every future discovery
    /// pass.
    pub fn blacklist(&self, mac: MacAddr) {
        self.blacklist.write().insert(mac);
    }

    /// Remove a MAC from the blacklist.
    pub fn whitelist(&self, mac: MacAddr) {
        self.blacklist.write().remove(&mac);
    }

    /// Release adapter resources, disconnecting every tracked probe.
    pub async fn destroy(&self) -> Result<()> {
        info!("Destroying probe manager");

        self.stop().await?;

        let probes: Vec<_> = self.probes.read().values().cloned().collect();
        for probe in probes {
            if let Err(e) = probe.disconnect().await {
                warn!("{}: error disconnecting: {}", probe.address(), e);
            }
        }

        self.probes.write().clear();

        Ok(())
    }

    /// Subscribe to probe lifecycle/data events.
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.event_tx.subscribe()
    }

    /// Currently tracked probes.
    pub fn probes(&self) -> HashMap<MacAddr, Arc<Probe>> {
        self.probes.read().clone()
    }

    /// Number of currently tracked probes.
    pub fn probe_count(&self) -> usize {
        self.probes.read().len()
    }

    /// Whether discovery is currently active.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    async fn supervisory_tick(
        scanner: &Arc<BleScanner>,
        probes: &Arc<RwLock<HashMap<MacAddr, Arc<Probe>>>>,
        blacklist: &Arc<RwLock<HashSet<MacAddr>>>,
        event_tx: &broadcast::Sender<ProbeEvent>,
        unit: TempUnit,
        connect_failures: &Arc<AtomicU32>,
    ) {
        let visible = scanner.discovered_probes();

        for (address, discovery) in visible {
            if blacklist.read().contains(&address) {
                continue;
            }
            if probes.read().contains_key(&address) {
                continue;
            }

            let probe = Arc::new(Probe::new(address, discovery.peripheral));
            probes.write().insert(address, probe.clone());

            let probes = probes.clone();
            let event_tx = event_tx.clone();
            let connect_failures = connect_failures.clone();

            tokio::spawn(async move {
                if let Err(e) = probe.connect_and_initialize(unit, event_tx).await {
                    warn!("{}: connect failed: {}", address, e);
                    connect_failures.fetch_add(1, Ordering::SeqCst);
                    probes.write().remove(&address);
                }
            });
        }

        // A probe that disconnected on its own (read error, etc.) is aged
        // out here rather than by the event it already emitted; the next
        // discovery pass will pick it back up if it is still advertising.
        probes
            .write()
            .retain(|_, probe| probe.state() != crate::probe::ProbeLifecycle::Disconnected);
    }
}

impl Drop for ProbeManager {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_connection_failures_constant() {
        assert_eq!(MAX_CONNECTION_FAILURES, 10);
    }

    #[test]
    fn test_supervisory_tick_constant() {
        assert_eq!(SUPERVISORY_TICK, Duration::from_secs(1));
    }
}
