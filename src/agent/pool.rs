//! Fixed-size worker pool.
//!
//! A coordinator owns the task source. Each of the `concurrency` workers
//! announces itself idle by sending a one-shot slot over a bounded channel;
//! the coordinator fills slots with pulled tasks and forwards worker results
//! back to the source. At most `concurrency` tasks are ever in flight.
//!
//! When the source has nothing to hand out, idle slots are parked and the
//! next pull waits out an exponential backoff with jitter.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::client::TaskSource;
use super::compute::compute;
use crate::error::TransportError;
use crate::model::{Task, TaskResult};

/// Worker pool sizing and polling behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers, and the bound on tasks in flight.
    pub concurrency: usize,
    /// Wait after the first empty pull; doubles per consecutive miss.
    pub poll_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            poll_backoff: Duration::from_millis(1000),
            max_backoff: Duration::from_millis(8000),
        }
    }
}

/// Live counters for a running pool.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    completed: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl PoolMetrics {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Results the source accepted.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Results the source refused (stale lease, failed expression).
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }

    /// Results lost to transport errors.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::SeqCst)
    }

    fn start(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    config: PoolConfig,
    source: Arc<dyn TaskSource>,
    metrics: Arc<PoolMetrics>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig, source: Arc<dyn TaskSource>) -> Self {
        Self {
            config,
            source,
            metrics: Arc::new(PoolMetrics::default()),
        }
    }

    pub fn metrics(&self) -> Arc<PoolMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run until `shutdown` resolves. Tasks already handed to a worker are
    /// finished and reported before this returns.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let concurrency = self.config.concurrency.max(1);
        let (ready_tx, mut ready_rx) = mpsc::channel::<oneshot::Sender<Task>>(concurrency);
        let (result_tx, mut result_rx) = mpsc::channel::<TaskResult>(concurrency);

        let workers: Vec<_> = (0..concurrency)
            .map(|index| {
                tokio::spawn(worker_loop(
                    index,
                    ready_tx.clone(),
                    result_tx.clone(),
                    Arc::clone(&self.metrics),
                ))
            })
            .collect();
        drop(ready_tx);
        drop(result_tx);

        info!(concurrency, "Worker pool started");

        tokio::pin!(shutdown);
        let mut idle: Vec<oneshot::Sender<Task>> = Vec::with_capacity(concurrency);
        let mut backoff = self.config.poll_backoff;
        let mut next_poll = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, draining worker pool");
                    break;
                }
                Some(result) = result_rx.recv() => {
                    self.deliver(result).await;
                }
                slot = ready_rx.recv() => match slot {
                    Some(slot) => idle.push(slot),
                    None => break,
                },
                _ = tokio::time::sleep_until(next_poll), if !idle.is_empty() => {
                    match self.source.pull_task().await {
                        Ok(Some(task)) => {
                            backoff = self.config.poll_backoff;
                            if let Some(slot) = idle.pop() {
                                if let Err(task) = slot.send(task) {
                                    warn!(task_id = %task.id, "Worker went away before taking its task");
                                }
                            }
                        }
                        Ok(None) => {
                            next_poll = Instant::now() + jittered(backoff);
                            backoff = (backoff * 2).min(self.config.max_backoff);
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to pull task");
                            next_poll = Instant::now() + jittered(backoff);
                            backoff = (backoff * 2).min(self.config.max_backoff);
                        }
                    }
                }
            }
        }

        // Idle workers see their slot dropped and exit; busy ones finish first.
        drop(idle);
        drop(ready_rx);
        while let Some(result) = result_rx.recv().await {
            self.deliver(result).await;
        }
        futures::future::join_all(workers).await;

        info!(
            completed = self.metrics.completed(),
            rejected = self.metrics.rejected(),
            "Worker pool stopped"
        );
    }

    async fn deliver(&self, result: TaskResult) {
        let id = result.id;
        match self.source.submit_result(result).await {
            Ok(()) => {
                self.metrics.completed.fetch_add(1, Ordering::SeqCst);
                debug!(task_id = %id, "Result accepted");
            }
            Err(TransportError::Rejected { reason, .. }) => {
                self.metrics.rejected.fetch_add(1, Ordering::SeqCst);
                warn!(task_id = %id, reason = %reason, "Result rejected, dropping");
            }
            Err(e) => {
                self.metrics.failed.fetch_add(1, Ordering::SeqCst);
                warn!(task_id = %id, error = %e, "Failed to submit result");
            }
        }
    }
}

async fn worker_loop(
    index: usize,
    ready_tx: mpsc::Sender<oneshot::Sender<Task>>,
    result_tx: mpsc::Sender<TaskResult>,
    metrics: Arc<PoolMetrics>,
) {
    loop {
        let (slot_tx, slot_rx) = oneshot::channel();
        if ready_tx.send(slot_tx).await.is_err() {
            break;
        }
        let Ok(task) = slot_rx.await else {
            break;
        };

        metrics.start();
        debug!(worker = index, task_id = %task.id, op = %task.operation, "Computing task");
        tokio::time::sleep(task.operation_time).await;
        let result = TaskResult {
            id: task.id,
            owner_id: task.owner_id,
            outcome: compute(&task),
        };
        metrics.finish();

        if result_tx.send(result).await.is_err() {
            break;
        }
    }
    debug!(worker = index, "Worker exiting");
}

/// `base` plus up to a quarter of it, at random.
fn jittered(base: Duration) -> Duration {
    let spread = base.as_millis() as u64 / 4;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::calc::Operator;
    use crate::model::{ExpressionId, OwnerId, TaskId, TaskOutcome};

    #[derive(Default)]
    struct MockSource {
        tasks: Mutex<VecDeque<Task>>,
        results: Mutex<Vec<TaskResult>>,
        pulls: AtomicUsize,
        reject: bool,
    }

    impl MockSource {
        fn push(&self, task: Task) {
            self.tasks.lock().unwrap().push_back(task);
        }

        fn results(&self) -> Vec<TaskResult> {
            self.results.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskSource for MockSource {
        async fn pull_task(&self) -> Result<Option<Task>, TransportError> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tasks.lock().unwrap().pop_front())
        }

        async fn submit_result(&self, result: TaskResult) -> Result<(), TransportError> {
            let id = result.id;
            self.results.lock().unwrap().push(result);
            if self.reject {
                return Err(TransportError::Rejected {
                    id,
                    reason: "task id not found".into(),
                });
            }
            Ok(())
        }
    }

    fn task(id: u64, lhs: u32, rhs: u32, millis: u64) -> Task {
        Task {
            id: TaskId(id),
            arg1: lhs.to_string(),
            arg2: rhs.to_string(),
            operation: Operator::Add,
            operation_time: Duration::from_millis(millis),
            owner_id: OwnerId(0),
            expression_id: ExpressionId(1),
        }
    }

    fn config(concurrency: usize) -> PoolConfig {
        PoolConfig {
            concurrency,
            poll_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(400),
        }
    }

    async fn wait_for_results(source: &MockSource, count: usize) {
        while source.results().len() < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_concurrency() {
        let source = Arc::new(MockSource::default());
        for id in 1..=10 {
            source.push(task(id, id as u32, 1, 100));
        }

        let pool = WorkerPool::new(config(3), source.clone());
        let metrics = pool.metrics();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(pool.run_until(async {
            let _ = stop_rx.await;
        }));

        wait_for_results(&source, 10).await;
        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(metrics.peak_in_flight(), 3);
        assert_eq!(metrics.in_flight(), 0);
        assert_eq!(metrics.completed(), 10);

        let mut results = source.results();
        results.sort_by_key(|r| r.id);
        for (n, result) in results.iter().enumerate() {
            let id = n as u64 + 1;
            assert_eq!(result.id, TaskId(id));
            assert_eq!(result.outcome, TaskOutcome::Success(id as f64 + 1.0));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_backs_off() {
        let source = Arc::new(MockSource::default());
        let pool = WorkerPool::new(config(3), source.clone());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(pool.run_until(async {
            let _ = stop_rx.await;
        }));

        // Misses at ~0, ~100, ~300, ~700ms, then every ~400ms.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        let pulls = source.pulls.load(Ordering::SeqCst);
        assert!((4..=5).contains(&pulls), "pulls = {pulls}");

        // Work arriving later is still picked up.
        source.push(task(1, 2, 3, 0));
        wait_for_results(&source, 1).await;
        assert_eq!(source.results()[0].outcome, TaskOutcome::Success(5.0));

        stop_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_finishes_in_flight_work() {
        let source = Arc::new(MockSource::default());
        source.push(task(1, 1, 1, 5000));

        let pool = WorkerPool::new(config(2), source.clone());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(pool.run_until(async {
            let _ = stop_rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(source.results().is_empty());
        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(source.results().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_results_are_counted() {
        let source = Arc::new(MockSource {
            reject: true,
            ..MockSource::default()
        });
        source.push(task(1, 1, 1, 10));
        source.push(task(2, 1, 1, 10));

        let pool = WorkerPool::new(config(2), source.clone());
        let metrics = pool.metrics();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(pool.run_until(async {
            let _ = stop_rx.await;
        }));

        wait_for_results(&source, 2).await;
        stop_tx.send(()).unwrap();
        handle.await.unwrap();

        assert_eq!(metrics.rejected(), 2);
        assert_eq!(metrics.completed(), 0);
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = jittered(base);
            assert!(d >= base && d <= Duration::from_millis(1250));
        }
        assert_eq!(jittered(Duration::from_millis(3)), Duration::from_millis(3));
    }
}
