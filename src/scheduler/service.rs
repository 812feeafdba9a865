use std::sync::Arc;

use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::lease::LeaseTable;
use super::queue::ReadyQueue;
use super::store::ExpressionStore;
use crate::calc::parse_with;
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::model::{
    ExpressionId, ExpressionStatus, ExpressionView, OwnerId, Statistics, Task, TaskId, TaskResult,
};

struct State {
    store: ExpressionStore,
    ready: ReadyQueue,
    leases: LeaseTable,
    requeued_total: u64,
    resolved_total: u64,
}

/// Expression registry, ready queue and lease table behind one lock.
pub struct Scheduler {
    state: RwLock<State>,
    lease_changed: Notify,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(State {
                store: ExpressionStore::new(config.timings),
                ready: ReadyQueue::new(),
                leases: LeaseTable::new(),
                requeued_total: 0,
                resolved_total: 0,
            }),
            lease_changed: Notify::new(),
            config,
        })
    }

    /// Parse and register an expression; its first tasks become ready.
    ///
    /// A rejected expression is still recorded (status Error) and its id is
    /// carried in the returned error.
    pub async fn submit_expression(
        &self,
        owner: OwnerId,
        text: &str,
    ) -> Result<ExpressionId, SchedulerError> {
        let parsed = parse_with(text, self.config.parse);
        let rejection = parsed.as_ref().err().copied();

        let id = {
            let mut state = self.state.write().await;
            let (id, tasks) = state.store.insert(owner, text, parsed);
            state.ready.extend(tasks);
            id
        };

        match rejection {
            Some(source) => {
                warn!(owner = %owner, expression_id = %id, error = %source, "Expression rejected");
                Err(SchedulerError::InvalidExpression { id, source })
            }
            None => Ok(id),
        }
    }

    pub async fn list_expressions(&self, owner: OwnerId) -> Vec<ExpressionView> {
        self.state.read().await.store.list(owner)
    }

    pub async fn get_expression(
        &self,
        owner: OwnerId,
        id: ExpressionId,
    ) -> Result<ExpressionView, SchedulerError> {
        self.state.read().await.store.get(owner, id)
    }

    /// Lease the oldest ready task to `holder`.
    pub async fn pull_task(&self, holder: &str) -> Option<Task> {
        let mut state = self.state.write().await;
        let task = state.ready.pop_front()?;
        Some(self.lease(&mut state, task, holder))
    }

    /// Lease the oldest ready task of one owner.
    pub async fn pull_task_for(&self, owner: OwnerId, holder: &str) -> Option<Task> {
        let mut state = self.state.write().await;
        let task = state.ready.pop_front_for(owner)?;
        Some(self.lease(&mut state, task, holder))
    }

    /// Accept a worker's result. Only a task that is currently leased and
    /// belongs to `result.owner_id` can be resolved; anything else is
    /// `TaskNotFound` and leaves the lease in place.
    pub async fn submit_result(
        &self,
        result: TaskResult,
    ) -> Result<ExpressionStatus, SchedulerError> {
        let mut state = self.state.write().await;
        if !state.leases.is_leased(result.id) {
            return Err(SchedulerError::TaskNotFound { id: result.id });
        }

        let outcome = state.store.resolve(&result)?;
        let holder = state
            .leases
            .release(result.id)
            .map(|lease| lease.holder)
            .unwrap_or_default();
        state.resolved_total += 1;
        debug!(
            task_id = %result.id,
            holder = %holder,
            status = %outcome.status,
            "Task result accepted"
        );

        state.ready.extend(outcome.unlocked);
        if !outcome.abandoned.is_empty() {
            let purged = state.ready.remove_all(&outcome.abandoned);
            for id in &outcome.abandoned {
                state.leases.release(*id);
            }
            info!(
                expression_id = %outcome.expression,
                abandoned = outcome.abandoned.len(),
                purged_from_queue = purged,
                "Dropped sibling tasks of failed expression"
            );
        }

        Ok(outcome.status)
    }

    /// Requeue every task whose lease ran out at or before `now`.
    pub async fn expire_leases(&self, now: Instant) -> usize {
        let mut state = self.state.write().await;
        let expired = state.leases.expire_due(now);
        let mut requeued = 0;

        for lease in expired {
            if !state.store.has_task(lease.task.id) {
                continue;
            }
            warn!(
                task_id = %lease.task.id,
                holder = %lease.holder,
                "Task lease expired, requeueing"
            );
            state.ready.push_back(lease.task);
            requeued += 1;
        }

        state.requeued_total += requeued as u64;
        requeued
    }

    pub async fn is_leased(&self, id: TaskId) -> bool {
        self.state.read().await.leases.is_leased(id)
    }

    pub async fn statistics(&self) -> Statistics {
        let state = self.state.read().await;
        Statistics {
            operations: state.store.operation_counts(),
            expressions: state.store.counts(),
            ready_tasks: state.ready.len(),
            leased_tasks: state.leases.len(),
            requeued_total: state.requeued_total,
            resolved_total: state.resolved_total,
        }
    }

    async fn next_lease_deadline(&self) -> Option<Instant> {
        self.state.write().await.leases.next_deadline()
    }

    fn lease(&self, state: &mut State, task: Task, holder: &str) -> Task {
        let deadline = Instant::now() + self.config.base_timeout + task.operation_time;
        state.leases.grant(task.clone(), deadline, holder);
        self.lease_changed.notify_one();
        debug!(task_id = %task.id, holder = %holder, "Task leased");
        task
    }
}

/// Background task that requeues tasks as their leases run out.
///
/// Sleeps until the earliest deadline and wakes early whenever a new lease
/// is granted.
pub fn spawn_lease_watcher(scheduler: Arc<Scheduler>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match scheduler.next_lease_deadline().await {
                Some(deadline) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(deadline) => {
                            scheduler.expire_leases(Instant::now()).await;
                        }
                        _ = scheduler.lease_changed.notified() => {}
                    }
                }
                None => scheduler.lease_changed.notified().await,
            }
        }
    })
}
