//! Bounded concurrent execution of a batch of jobs.

use async_trait::async_trait;
use chrono::Local;
use futures_util::stream::{self, Stream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::entity::EntityId;
use super::error::{Result, StockpileError};
use super::orchestrator::Orchestrator;
use super::traits::ProviderKey;

/// One unit of work: fetch one entity from one provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Job {
    pub kind: ProviderKey,
    pub entity: EntityId,
}

impl Job {
    pub fn new(kind: ProviderKey, entity: EntityId) -> Self {
        Self { kind, entity }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.kind, self.entity)
    }
}

/// An ordered list of jobs, only ever used to drive one pass of the pool.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    jobs: Vec<Job>,
}

impl Batch {
    pub fn new(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    /// Every entity crossed with every provider kind, entity-major.
    pub fn generate(entities: &[EntityId], kinds: &[ProviderKey]) -> Self {
        let jobs = entities
            .iter()
            .flat_map(|entity| kinds.iter().map(|kind| Job::new(*kind, entity.clone())))
            .collect();
        Self { jobs }
    }

    /// Randomizes job order, so that an interrupted and restarted worker does not
    /// hammer the same endpoints in the same order.
    pub fn shuffled(mut self) -> Self {
        fastrand::shuffle(&mut self.jobs);
        self
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// What a successful job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobReport {
    pub fields: usize,
    pub failed_fields: usize,
    pub cache_hit: bool,
}

/// The result of one job, successful or not.
#[derive(Debug)]
pub struct JobOutcome {
    pub job: Job,
    pub result: Result<JobReport>,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Tally of a drained batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cache_hits: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[JobOutcome]) -> Self {
        outcomes.iter().fold(
            Self {
                total: outcomes.len(),
                ..Self::default()
            },
            |mut summary, outcome| {
                match &outcome.result {
                    Ok(report) => {
                        summary.succeeded += 1;
                        if report.cache_hit {
                            summary.cache_hits += 1;
                        }
                    }
                    Err(_) => summary.failed += 1,
                }
                summary
            },
        )
    }
}

/// Executes a single job. The seam between the pool and whatever does the work.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job) -> Result<JobReport>;
}

/// Runs batches with at most `workers` jobs in flight.
///
/// Each job is spawned onto the multi-threaded runtime, so jobs are spread over its
/// worker threads. Outcomes come back in completion order, not submission order. A
/// job that errors or panics is logged with its identity and reported as a failed
/// outcome; it never cancels its siblings.
#[derive(Clone)]
pub struct WorkerPool {
    runner: Arc<dyn JobRunner>,
    workers: usize,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// `workers` is clamped to at least one.
    pub fn new(runner: Arc<dyn JobRunner>, workers: usize) -> Self {
        Self {
            runner,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Submits every job of the batch and yields outcomes as jobs complete.
    pub fn run(&self, batch: Batch) -> impl Stream<Item = JobOutcome> + Send + 'static {
        let total = batch.len();
        let remaining = Arc::new(AtomicUsize::new(total));
        let runner = self.runner.clone();

        stream::iter(batch.jobs)
            .map(move |job| {
                let runner = runner.clone();
                async move {
                    let task_job = job.clone();
                    let task = tokio::spawn(async move { runner.run(&task_job).await });
                    let result = match task.await {
                        Ok(result) => result,
                        Err(err) => Err(StockpileError::JobPanicked(err.to_string())),
                    };
                    JobOutcome { job, result }
                }
            })
            .buffer_unordered(self.workers)
            .map(move |outcome| {
                let left = remaining.fetch_sub(1, Ordering::SeqCst) - 1;
                match &outcome.result {
                    Ok(report) => tracing::debug!("{} done: {report:?}", outcome.job),
                    Err(err) => tracing::error!("{} generated an error: {err}", outcome.job),
                }
                tracing::info!("jobs left in batch - {left}/{total}");
                outcome
            })
    }

    /// Runs the whole batch and collects every outcome.
    pub async fn drain(&self, batch: Batch) -> Vec<JobOutcome> {
        self.run(batch).collect().await
    }
}

/// Routes each job to the orchestrator of its provider kind.
#[derive(Debug, Default)]
pub struct Dispatcher {
    orchestrators: HashMap<ProviderKey, Arc<Orchestrator>>,
    force: bool,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrators
            .insert(orchestrator.provider().key(), Arc::new(orchestrator));
        self
    }

    /// Bypass today's cache and refetch everything.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Provider kinds this dispatcher can serve, in a stable order.
    pub fn kinds(&self) -> Vec<ProviderKey> {
        let mut kinds: Vec<ProviderKey> = self.orchestrators.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

#[async_trait]
impl JobRunner for Dispatcher {
    async fn run(&self, job: &Job) -> Result<JobReport> {
        let orchestrator = self.orchestrators.get(&job.kind).ok_or_else(|| {
            StockpileError::ConfigError(format!("no provider registered for {}", job.kind))
        })?;

        let fetched = orchestrator
            .fetch_detailed(&job.entity, Local::now().date_naive(), self.force)
            .await?;

        Ok(JobReport {
            fields: fetched.document.len(),
            failed_fields: fetched.document.failures(),
            cache_hit: fetched.is_cache_hit(),
        })
    }
}
