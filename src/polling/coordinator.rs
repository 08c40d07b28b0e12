use crate::app_config::Polling;
use crate::domain::{ConnectionParameters, EntryId, PollingDataset, RegisteredDeviceRecord};
use crate::pikvm::{ApiConnector, DeviceApi, PinnedConnector, Resource};
use crate::polling::snapshot::{CycleError, PollStatus, Snapshot};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_retry::RetryIf;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, instrument, warn};

enum CycleOutcome {
    Skipped,
    Updated(PollingDataset),
    Stale(CycleError),
    Failed(CycleError),
}

/// Owns the polling task of one registered device. Dropping the handle stops the task as well.
#[derive(Debug)]
pub struct CoordinatorHandle {
    entry_id: EntryId,
    snapshots: watch::Receiver<Snapshot>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Cancels the pending cycle and waits for the task to end. Nothing is published afterwards.
    pub async fn shutdown(self) {
        debug!(entry_id = %self.entry_id, "🛑 Stopping coordinator...");
        self.shutdown_tx.send(true).unwrap_or_default();
        if let Err(e) = self.task.await {
            warn!(entry_id = %self.entry_id, "⚠️ Stopping coordinator... failed, {}", e);
            return;
        }
        debug!(entry_id = %self.entry_id, "🛑 Stopping coordinator... OK");
    }
}

/// Starts polling a registered device with a client pinned to its certificate.
pub fn start(record: &RegisteredDeviceRecord, polling: &Polling) -> CoordinatorHandle {
    let connector = PinnedConnector::for_record(record, polling.request_timeout());
    start_with(record, Arc::new(connector), polling)
}

pub fn start_with(record: &RegisteredDeviceRecord, connector: Arc<dyn ApiConnector>, polling: &Polling) -> CoordinatorHandle {
    let (snapshot_tx, snapshots) = watch::channel(Snapshot::pending());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut coordinator = Coordinator {
        entry_id: record.entry_id,
        connection: record.connection.clone(),
        connector,
        polling: polling.clone(),
        session: None,
        snapshot_tx,
    };
    coordinator.session();

    info!(entry_id = %record.entry_id, "🔄 Polling '{}' every {:?}", record.title, polling.interval());
    let task = tokio::spawn(coordinator.run(shutdown_rx));

    CoordinatorHandle {
        entry_id: record.entry_id,
        snapshots,
        shutdown_tx,
        task,
    }
}

struct Coordinator {
    entry_id: EntryId,
    connection: ConnectionParameters,
    connector: Arc<dyn ApiConnector>,
    polling: Polling,
    session: Option<Arc<dyn DeviceApi>>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Coordinator {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.polling.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = interval.tick() => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                outcome = self.cycle() => outcome,
            };

            if *shutdown.borrow() {
                break;
            }
            self.publish(outcome);
        }

        debug!(entry_id = %self.entry_id, "🛑 Coordinator stopped");
    }

    #[instrument(skip_all, fields(entry_id = %self.entry_id))]
    async fn cycle(&mut self) -> CycleOutcome {
        let Some(api) = self.session() else {
            return CycleOutcome::Skipped;
        };

        debug!("🔄 Polling {}...", self.connection.base_url);
        let connection = &self.connection;
        let result = RetryIf::spawn(
            backoff(&self.polling),
            || fetch_dataset(api.as_ref(), connection),
            |e: &CycleError| {
                if e.is_transient() {
                    warn!("⚠️ Polling {}... failed, {}. Retrying...", connection.base_url, e);
                }
                e.is_transient()
            },
        )
        .await;

        match result {
            Ok(dataset) => {
                debug!("🔄 Polling {}... OK", self.connection.base_url);
                CycleOutcome::Updated(dataset)
            }
            Err(e) if e.is_transient() => {
                warn!("⚠️ Polling {}... failed after {} attempt(s), {}", self.connection.base_url, self.polling.max_attempts(), e);
                self.session = None;
                CycleOutcome::Stale(e)
            }
            Err(e) => {
                warn!("⚠️ Polling {}... failed, {}", self.connection.base_url, e);
                CycleOutcome::Failed(e)
            }
        }
    }

    /// The current API session, connecting first when there is none.
    fn session(&mut self) -> Option<Arc<dyn DeviceApi>> {
        if self.session.is_none() {
            match self.connector.connect() {
                Ok(api) => self.session = Some(api),
                Err(e) => warn!(entry_id = %self.entry_id, "⚠️ Connecting to {}... failed, {}. Skipping this cycle", self.connection.base_url, e),
            }
        }
        self.session.clone()
    }

    fn publish(&self, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Skipped => {}
            CycleOutcome::Updated(dataset) => self.snapshot_tx.send_modify(|snapshot| {
                snapshot.dataset = Some(Arc::new(dataset));
                snapshot.status = PollStatus::Fresh;
                snapshot.last_success = Some(Utc::now());
            }),
            CycleOutcome::Stale(_) => self.snapshot_tx.send_modify(|snapshot| snapshot.status = PollStatus::Stale),
            CycleOutcome::Failed(e) => self.snapshot_tx.send_modify(|snapshot| snapshot.status = PollStatus::Failed(e)),
        }
    }
}

/// Delays between the attempts of one cycle, doubling from the initial backoff at millisecond
/// resolution and capped at the interval.
fn backoff(polling: &Polling) -> impl Iterator<Item = Duration> {
    let initial_millis = u64::try_from(polling.initial_backoff().as_millis()).unwrap_or(u64::MAX);
    // The strategy yields 2, 4, 8... times the factor; halving starts it at the initial backoff.
    ExponentialBackoff::from_millis(2)
        .factor(initial_millis)
        .max_delay(polling.interval().saturating_mul(2))
        .map(|delay| delay / 2)
        .take(polling.max_attempts() - 1)
}

/// Fetches both resources in order and merges them. Credentials are computed per attempt since the
/// one-time code changes over time.
async fn fetch_dataset(api: &dyn DeviceApi, connection: &ConnectionParameters) -> Result<PollingDataset, CycleError> {
    let auth = connection.basic_auth();
    let info = api.fetch(Resource::Info, &auth).await?;
    let msd = api.fetch(Resource::Msd, &auth).await?;
    Ok(PollingDataset::from_responses(info, msd)?)
}
