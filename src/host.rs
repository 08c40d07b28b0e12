use kvmlink::app_config::Polling;
use kvmlink::diagnostics::diagnostics;
use kvmlink::domain::EntryId;
use kvmlink::domain::events::RegistryEvent;
use kvmlink::polling::{self, CoordinatorHandle};
use kvmlink::registry::IdentityRegistry;
use kvmlink::telemetry::sensor_readings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

/// Runs one coordinator per registered entry and keeps the set in line with the registry.
pub struct Host {
    registry: Arc<IdentityRegistry>,
    polling: Polling,
    coordinators: HashMap<EntryId, CoordinatorHandle>,
}

impl Host {
    pub fn new(registry: Arc<IdentityRegistry>, polling: Polling) -> Self {
        Host {
            registry,
            polling,
            coordinators: HashMap::new(),
        }
    }

    pub fn start_all(&mut self) {
        for record in self.registry.records() {
            self.start(record.entry_id);
        }
    }

    /// Follows registry events until the channel closes.
    pub async fn follow(&mut self) {
        let mut events = self.registry.subscribe();
        loop {
            match events.recv().await {
                Ok(RegistryEvent::Added(entry_id)) => self.start(entry_id),
                Ok(RegistryEvent::Updated(entry_id)) => {
                    info!(entry_id = %entry_id, "♻️ Reloading coordinator");
                    self.stop(entry_id).await;
                    self.start(entry_id);
                }
                Ok(RegistryEvent::Removed(entry_id)) => self.stop(entry_id).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Missed {} registry events, restarting every coordinator", skipped);
                    self.shutdown().await;
                    self.start_all();
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    pub async fn shutdown(&mut self) {
        for (_, handle) in self.coordinators.drain() {
            handle.shutdown().await;
        }
    }

    fn start(&mut self, entry_id: EntryId) {
        let Some(record) = self.registry.get(entry_id) else {
            debug!(entry_id = %entry_id, "Entry vanished before its coordinator started");
            return;
        };

        let handle = polling::start(&record, &self.polling);
        let mut snapshots = handle.subscribe();
        let interval = self.polling.interval();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let snapshot = snapshots.borrow_and_update().clone();
                for reading in sensor_readings(&record, &snapshot) {
                    info!(
                        entry_id = %record.entry_id,
                        available = reading.available,
                        "📈 {} = {}",
                        reading.name,
                        reading.state.map(|state| state.to_string()).unwrap_or_else(|| "unknown".to_string())
                    );
                }
                trace!("{}", diagnostics(&record, &snapshot, interval));
            }
        });

        if let Some(previous) = self.coordinators.insert(entry_id, handle) {
            tokio::spawn(previous.shutdown());
        }
    }

    async fn stop(&mut self, entry_id: EntryId) {
        if let Some(handle) = self.coordinators.remove(&entry_id) {
            handle.shutdown().await;
        }
    }
}
