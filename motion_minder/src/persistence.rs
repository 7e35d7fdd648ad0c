use std::num::NonZeroU64;

use moonraker::{MoonrakerClient, MoonrakerError};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::models::OdometerTotals;

pub const ODOMETER_KEY: &str = "odometer";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Moonraker(#[from] MoonrakerError),

    #[error("Stored totals are malformed: {source}")]
    Malformed {
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Moonraker(e) => e.is_transient(),
            StoreError::Malformed { .. } => false,
        }
    }
}

#[async_trait::async_trait]
pub trait OdometerStore: Send + Sync {
    async fn load_totals(&self) -> Result<OdometerTotals, StoreError>;

    async fn save_totals(&self, totals: &OdometerTotals) -> Result<(), StoreError>;
}

pub struct MoonrakerStore {
    client: MoonrakerClient,
    namespace: String,
}

impl MoonrakerStore {
    pub fn new(client: MoonrakerClient, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait::async_trait]
impl OdometerStore for MoonrakerStore {
    async fn load_totals(&self) -> Result<OdometerTotals, StoreError> {
        match self
            .client
            .database_get_item(&self.namespace, ODOMETER_KEY)
            .await?
        {
            Some(value) => {
                serde_json::from_value(value).map_err(|source| StoreError::Malformed { source })
            }
            None => Ok(OdometerTotals::default()),
        }
    }

    async fn save_totals(&self, totals: &OdometerTotals) -> Result<(), StoreError> {
        let value =
            serde_json::to_value(totals).map_err(|source| StoreError::Malformed { source })?;

        self.client
            .database_post_item(&self.namespace, ODOMETER_KEY, &value)
            .await?;

        Ok(())
    }
}

#[derive(Debug)]
pub struct PersistenceScheduler {
    interval: NonZeroU64,
    counter: u64,
}

impl PersistenceScheduler {
    pub fn new(interval: NonZeroU64) -> Self {
        Self {
            interval,
            counter: 0,
        }
    }

    pub fn on_motion_processed(&mut self) -> bool {
        self.counter += 1;
        self.counter % self.interval.get() == 0
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    snapshots: mpsc::UnboundedSender<OdometerTotals>,
}

impl PersistenceHandle {
    pub fn new(snapshots: mpsc::UnboundedSender<OdometerTotals>) -> Self {
        Self { snapshots }
    }

    pub fn persist(&self, totals: OdometerTotals) {
        if self.snapshots.send(totals).is_err() {
            error!("Persistence writer is gone, dropping snapshot {:?}", totals);
        }
    }
}

/// Writes snapshots in arrival order until every handle is dropped. When several
/// are queued only the newest is written.
pub async fn run_persistence_writer(
    store: impl OdometerStore,
    mut snapshots: mpsc::UnboundedReceiver<OdometerTotals>,
) {
    while let Some(mut totals) = snapshots.recv().await {
        while let Ok(newer) = snapshots.try_recv() {
            totals = newer;
        }

        match store.save_totals(&totals).await {
            Ok(()) => debug!(
                "Saved odometer x={:.3} y={:.3} z={:.3}",
                totals.x, totals.y, totals.z
            ),
            // The next flush carries a full snapshot, so nothing is lost for good.
            Err(e) => error!("Failed to save odometer totals: {}", e),
        }
    }

    info!("Persistence writer stopped");
}

pub fn spawn_persistence_writer(
    store: impl OdometerStore + 'static,
) -> (PersistenceHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_persistence_writer(store, rx));
    (PersistenceHandle::new(tx), handle)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    pub(crate) struct MemoryStore {
        pub(crate) saved: Arc<Mutex<Vec<OdometerTotals>>>,
        pub(crate) fail_saves: bool,
    }

    impl MemoryStore {
        pub(crate) fn saved(&self) -> Vec<OdometerTotals> {
            self.saved.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl OdometerStore for MemoryStore {
        async fn load_totals(&self) -> Result<OdometerTotals, StoreError> {
            Ok(self.saved().last().copied().unwrap_or_default())
        }

        async fn save_totals(&self, totals: &OdometerTotals) -> Result<(), StoreError> {
            if self.fail_saves {
                return Err(MoonrakerError::decode("database unavailable").into());
            }
            self.saved.lock().unwrap().push(*totals);
            Ok(())
        }
    }

    #[test]
    fn flushes_on_every_nth_report() {
        let mut scheduler = PersistenceScheduler::new(NonZeroU64::new(20).unwrap());

        let flushed: Vec<u64> = (1..=65)
            .filter(|_| scheduler.on_motion_processed())
            .collect();

        assert_eq!(flushed, vec![20, 40, 60]);
        assert_eq!(scheduler.counter(), 65);
    }

    #[test]
    fn interval_of_one_flushes_every_report() {
        let mut scheduler = PersistenceScheduler::new(NonZeroU64::new(1).unwrap());

        assert!((0..5).all(|_| scheduler.on_motion_processed()));
    }

    #[tokio::test]
    async fn writer_saves_snapshots_until_closed() {
        let store = MemoryStore::default();
        let (handle, task) = spawn_persistence_writer(store.clone());

        handle.persist(OdometerTotals::new(1.0, 0.0, 0.0));
        drop(handle);
        task.await.unwrap();

        assert_eq!(store.saved().last(), Some(&OdometerTotals::new(1.0, 0.0, 0.0)));
    }

    #[tokio::test]
    async fn writer_keeps_running_after_failed_save() {
        let store = MemoryStore {
            fail_saves: true,
            ..Default::default()
        };
        let (handle, task) = spawn_persistence_writer(store.clone());

        handle.persist(OdometerTotals::new(1.0, 0.0, 0.0));
        handle.persist(OdometerTotals::new(2.0, 0.0, 0.0));
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        drop(handle);
        task.await.unwrap();
        assert!(store.saved().is_empty());
    }

    #[tokio::test]
    async fn queued_snapshots_collapse_to_newest() {
        let store = MemoryStore::default();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(OdometerTotals::new(1.0, 0.0, 0.0)).unwrap();
        tx.send(OdometerTotals::new(2.0, 0.0, 0.0)).unwrap();
        tx.send(OdometerTotals::new(3.0, 1.0, 0.0)).unwrap();
        drop(tx);

        run_persistence_writer(store.clone(), rx).await;

        assert_eq!(store.saved(), vec![OdometerTotals::new(3.0, 1.0, 0.0)]);
    }
}
