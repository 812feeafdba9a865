//! Expression store: per-owner expression records plus the task index that
//! maps each outstanding task to its placeholder in a reduction buffer.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::calc::{Operator, Token};
use crate::config::OperationTimings;
use crate::engine::{Handle, Progress, ReadyTriple, Reduction, TaskIdAllocator, format_value};
use crate::error::{ParseError, SchedulerError};
use crate::model::{
    ExpressionCounts, ExpressionId, ExpressionStatus, ExpressionView, OwnerId, Task, TaskId,
    TaskOutcome, TaskResult,
};

/// Where an expression is in its lifecycle. Waiting always carries a
/// non-empty buffer; Done and Error always carry the result text.
#[derive(Debug, Clone)]
pub enum ExpressionState {
    Waiting(Reduction),
    Done(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub id: ExpressionId,
    pub owner: OwnerId,
    pub text: String,
    pub state: ExpressionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Expression {
    pub fn status(&self) -> ExpressionStatus {
        match self.state {
            ExpressionState::Waiting(_) => ExpressionStatus::Waiting,
            ExpressionState::Done(_) => ExpressionStatus::Done,
            ExpressionState::Error(_) => ExpressionStatus::Error,
        }
    }

    pub fn result(&self) -> &str {
        match &self.state {
            ExpressionState::Waiting(_) => "",
            ExpressionState::Done(result) | ExpressionState::Error(result) => result,
        }
    }

    pub fn view(&self) -> ExpressionView {
        ExpressionView {
            id: self.id,
            status: self.status(),
            result: self.result().to_string(),
            text: self.text.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn finish(&mut self, state: ExpressionState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Copy)]
struct TaskRef {
    owner: OwnerId,
    expression: ExpressionId,
    position: Handle,
}

/// What a resolved task did to its expression.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub expression: ExpressionId,
    pub status: ExpressionStatus,
    /// Tasks unlocked by the value, ready to enqueue.
    pub unlocked: Vec<Task>,
    /// Sibling tasks orphaned because the expression failed.
    pub abandoned: Vec<TaskId>,
}

pub struct ExpressionStore {
    expressions: HashMap<OwnerId, BTreeMap<ExpressionId, Expression>>,
    tasks: HashMap<TaskId, TaskRef>,
    ids: TaskIdAllocator,
    timings: OperationTimings,
    operations: BTreeMap<Operator, u64>,
}

impl ExpressionStore {
    pub fn new(timings: OperationTimings) -> Self {
        Self {
            expressions: HashMap::new(),
            tasks: HashMap::new(),
            ids: TaskIdAllocator::new(),
            timings,
            operations: BTreeMap::new(),
        }
    }

    /// Record a submission and return its id plus the initially ready tasks.
    ///
    /// Parse failures are recorded too, as Error expressions.
    pub fn insert(
        &mut self,
        owner: OwnerId,
        text: &str,
        parsed: Result<Vec<Token>, ParseError>,
    ) -> (ExpressionId, Vec<Task>) {
        let table = self.expressions.entry(owner).or_default();
        let id = ExpressionId(table.keys().next_back().map_or(1, |last| last.0 + 1));
        let now = Utc::now();

        // Every operator symbol in the submitted text counts, valid or not.
        for op in text.chars().filter_map(Operator::from_symbol) {
            *self.operations.entry(op).or_default() += 1;
        }

        let mut tasks = Vec::new();
        let state = match parsed {
            Err(err) => ExpressionState::Error(err.to_string()),
            Ok(rpn) => {
                match rpn.as_slice() {
                    [Token::Number(value)] => ExpressionState::Done(format_value(*value)),
                    _ => {
                        let mut reduction = Reduction::from_rpn(&rpn);
                        let ready = reduction.extract_ready(&mut self.ids);
                        tasks = self.index_triples(owner, id, ready);
                        ExpressionState::Waiting(reduction)
                    }
                }
            }
        };

        let expression = Expression {
            id,
            owner,
            text: text.to_string(),
            state,
            created_at: now,
            updated_at: now,
        };

        info!(
            owner = %owner,
            expression_id = %id,
            status = %expression.status(),
            tasks = tasks.len(),
            "Expression recorded"
        );

        self.expressions.entry(owner).or_default().insert(id, expression);
        (id, tasks)
    }

    /// Feed a task result back into its expression.
    ///
    /// The task must belong to `result.owner_id`. On any error the task index
    /// is left as it was.
    pub fn resolve(&mut self, result: &TaskResult) -> Result<ResolveOutcome, SchedulerError> {
        let task_id = result.id;
        let task_ref = self
            .tasks
            .get(&task_id)
            .copied()
            .filter(|r| r.owner == result.owner_id)
            .ok_or(SchedulerError::TaskNotFound { id: task_id })?;

        let expression = self
            .expressions
            .get_mut(&task_ref.owner)
            .and_then(|table| table.get_mut(&task_ref.expression))
            .ok_or(SchedulerError::ExpressionNotFound {
                owner: task_ref.owner,
                id: task_ref.expression,
            })?;

        let ExpressionState::Waiting(reduction) = &mut expression.state else {
            warn!(task_id = %task_id, "Result for an expression that is no longer waiting");
            return Err(SchedulerError::TaskNotFound { id: task_id });
        };

        let failure = match &result.outcome {
            TaskOutcome::Success(value) if value.is_finite() => {
                let progress =
                    reduction.resolve(task_ref.position, task_id, *value, &mut self.ids)?;
                self.tasks.remove(&task_id);
                match progress {
                    Progress::Complete(value) => {
                        expression.finish(ExpressionState::Done(format_value(value)));
                        info!(
                            expression_id = %task_ref.expression,
                            result = %expression.result(),
                            "Expression done"
                        );
                        return Ok(ResolveOutcome {
                            expression: task_ref.expression,
                            status: ExpressionStatus::Done,
                            unlocked: Vec::new(),
                            abandoned: Vec::new(),
                        });
                    }
                    Progress::Pending(ready) => {
                        expression.updated_at = Utc::now();
                        let unlocked =
                            self.index_triples(task_ref.owner, task_ref.expression, ready);
                        debug!(
                            task_id = %task_id,
                            unlocked = unlocked.len(),
                            "Task value spliced into expression"
                        );
                        return Ok(ResolveOutcome {
                            expression: task_ref.expression,
                            status: ExpressionStatus::Waiting,
                            unlocked,
                            abandoned: Vec::new(),
                        });
                    }
                }
            }
            TaskOutcome::Success(value) => format_value(*value),
            TaskOutcome::Failure(reason) => reason.clone(),
        };

        self.tasks.remove(&task_id);
        expression.finish(ExpressionState::Error(failure));
        info!(
            expression_id = %task_ref.expression,
            reason = %expression.result(),
            "Expression failed"
        );

        let abandoned: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, r)| r.owner == task_ref.owner && r.expression == task_ref.expression)
            .map(|(id, _)| *id)
            .collect();
        for id in &abandoned {
            self.tasks.remove(id);
        }

        Ok(ResolveOutcome {
            expression: task_ref.expression,
            status: ExpressionStatus::Error,
            unlocked: Vec::new(),
            abandoned,
        })
    }

    /// All expressions of `owner`, ordered by id.
    pub fn list(&self, owner: OwnerId) -> Vec<ExpressionView> {
        self.expressions
            .get(&owner)
            .map(|table| table.values().map(Expression::view).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, owner: OwnerId, id: ExpressionId) -> Result<ExpressionView, SchedulerError> {
        self.expressions
            .get(&owner)
            .and_then(|table| table.get(&id))
            .map(Expression::view)
            .ok_or(SchedulerError::ExpressionNotFound { owner, id })
    }

    pub fn has_task(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn counts(&self) -> ExpressionCounts {
        let mut counts = ExpressionCounts::default();
        for expression in self.expressions.values().flat_map(BTreeMap::values) {
            match expression.status() {
                ExpressionStatus::Waiting => counts.waiting += 1,
                ExpressionStatus::Done => counts.done += 1,
                ExpressionStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Operator occurrences keyed by symbol; every operator is present.
    pub fn operation_counts(&self) -> BTreeMap<String, u64> {
        Operator::ALL
            .iter()
            .map(|op| (op.to_string(), self.operations.get(op).copied().unwrap_or(0)))
            .collect()
    }

    fn index_triples(
        &mut self,
        owner: OwnerId,
        expression: ExpressionId,
        ready: Vec<ReadyTriple>,
    ) -> Vec<Task> {
        ready
            .into_iter()
            .map(|triple| {
                self.tasks.insert(
                    triple.task_id,
                    TaskRef {
                        owner,
                        expression,
                        position: triple.position,
                    },
                );
                Task {
                    id: triple.task_id,
                    arg1: triple.lhs.to_string(),
                    arg2: triple.rhs.to_string(),
                    operation: triple.operator,
                    operation_time: self.timings.for_operator(triple.operator),
                    owner_id: owner,
                    expression_id: expression,
                }
            })
            .collect()
    }
}
