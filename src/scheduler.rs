//! Worker mode: drain a batch, sleep, repeat until told to stop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::entity::EntityId;
use super::error::{Result, StockpileError};
use super::pool::{Batch, BatchSummary, WorkerPool};
use super::traits::ProviderKey;

/// Produces the entity list for each pass; called once per batch so the universe can
/// change between polls. It may block (file reads), so it runs on the blocking pool.
pub type EntitySource = Arc<dyn Fn() -> Result<Vec<EntityId>> + Send + Sync>;

/// Requests a running [`Scheduler`] to stop.
///
/// Stopping takes effect between batches or during the poll sleep; jobs already in
/// flight are allowed to finish.
#[derive(Debug, Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Long-lived refresher alternating "drain batch" and "sleep until next poll".
pub struct Scheduler {
    pool: WorkerPool,
    entities: EntitySource,
    kinds: Vec<ProviderKey>,
    poll_interval: Duration,
    shuffle: bool,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pool", &self.pool)
            .field("kinds", &self.kinds)
            .field("poll_interval", &self.poll_interval)
            .field("shuffle", &self.shuffle)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(
        pool: WorkerPool,
        entities: EntitySource,
        kinds: Vec<ProviderKey>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            entities,
            kinds,
            poll_interval,
            shuffle: false,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Builds the next batch from the current entity list.
    pub async fn next_batch(&self) -> Result<Batch> {
        let source = Arc::clone(&self.entities);
        let entities = tokio::task::spawn_blocking(move || source())
            .await
            .map_err(|err| StockpileError::JobPanicked(format!("entity source: {err}")))??;
        let batch = Batch::generate(&entities, &self.kinds);
        tracing::info!(
            "generated batch of {} jobs ({} entities x {} providers)",
            batch.len(),
            entities.len(),
            self.kinds.len()
        );

        if self.shuffle {
            tracing::info!("shuffling the batch to randomize things ...");
            return Ok(batch.shuffled());
        }
        Ok(batch)
    }

    /// Generates and drains a single batch.
    pub async fn run_once(&self) -> Result<BatchSummary> {
        let batch = self.next_batch().await?;
        let outcomes = self.pool.drain(batch).await;
        let summary = BatchSummary::from_outcomes(&outcomes);
        tracing::info!(
            "worker jobs done: {} ok ({} cached), {} failed",
            summary.succeeded,
            summary.cache_hits,
            summary.failed
        );
        Ok(summary)
    }

    /// Runs batches until `shutdown` fires, returning the number of completed passes.
    ///
    /// A pass whose entity list cannot be built is logged and skipped; the scheduler
    /// tries again after the poll interval.
    pub async fn run(&self, shutdown: &Shutdown) -> usize {
        let mut stop = shutdown.subscribe();
        let mut passes = 0;

        while !*stop.borrow() {
            match self.run_once().await {
                Ok(_) => passes += 1,
                Err(err) => tracing::error!("failed to build batch: {err}"),
            }

            if *stop.borrow() {
                break;
            }

            tracing::info!(
                "sleeping for {:?} ({:.1} h)",
                self.poll_interval,
                self.poll_interval.as_secs_f64() / 3600.0
            );
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = stop.wait_for(|stopped| *stopped) => {}
            }
        }

        tracing::info!("scheduler stopped after {passes} passes");
        passes
    }
}
