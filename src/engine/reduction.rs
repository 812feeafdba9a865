//! Incremental reduction of an RPN buffer into dispatchable triples.

use tracing::debug;

use super::buffer::{Handle, TokenBuffer};
use crate::calc::{Operator, Token};
use crate::error::SchedulerError;
use crate::model::TaskId;

/// Source of globally unique task ids. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct TaskIdAllocator {
    next: u64,
}

impl TaskIdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> TaskId {
        let id = TaskId(self.next);
        self.next += 1;
        id
    }
}

impl Default for TaskIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Two adjacent numbers followed by an operator, spliced out of the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyTriple {
    pub task_id: TaskId,
    /// Where the placeholder for this task sits.
    pub position: Handle,
    pub lhs: f64,
    pub rhs: f64,
    pub operator: Operator,
}

/// Result of feeding a task value back into the buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Still reducing; these triples were unlocked by the value.
    Pending(Vec<ReadyTriple>),
    /// The buffer collapsed to a single number.
    Complete(f64),
}

/// One expression's reduction buffer.
#[derive(Debug, Clone)]
pub struct Reduction {
    buffer: TokenBuffer,
}

impl Reduction {
    pub fn from_rpn(tokens: &[Token]) -> Self {
        Self {
            buffer: tokens.iter().copied().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Single front-to-back pass. Every `Number, Number, Operator` run becomes
    /// one placeholder in place; scanning resumes right after it.
    pub fn extract_ready(&mut self, ids: &mut TaskIdAllocator) -> Vec<ReadyTriple> {
        let mut ready = Vec::new();
        let mut cursor = self.buffer.front();

        while let Some(first) = cursor {
            let Some((lhs, rhs, operator, second, third)) = self.triple_at(first) else {
                cursor = self.buffer.next(first);
                continue;
            };

            let task_id = ids.allocate();
            self.buffer.remove(second);
            self.buffer.remove(third);
            self.buffer.replace(first, Token::Placeholder(task_id));

            ready.push(ReadyTriple {
                task_id,
                position: first,
                lhs,
                rhs,
                operator,
            });
            cursor = self.buffer.next(first);
        }

        debug!(
            extracted = ready.len(),
            remaining = self.buffer.len(),
            "Extracted ready triples"
        );
        ready
    }

    /// Replace the placeholder for `task_id` at `position` with `value`.
    pub fn resolve(
        &mut self,
        position: Handle,
        task_id: TaskId,
        value: f64,
        ids: &mut TaskIdAllocator,
    ) -> Result<Progress, SchedulerError> {
        match self.buffer.get(position) {
            Some(Token::Placeholder(id)) if *id == task_id => {}
            _ => return Err(SchedulerError::StalePosition { id: task_id }),
        }
        self.buffer.replace(position, Token::Number(value));

        if self.buffer.len() == 1 {
            self.buffer.clear();
            return Ok(Progress::Complete(value));
        }

        Ok(Progress::Pending(self.extract_ready(ids)))
    }

    fn triple_at(&self, first: Handle) -> Option<(f64, f64, Operator, Handle, Handle)> {
        let lhs = self.buffer.get(first)?.as_number()?;
        let second = self.buffer.next(first)?;
        let rhs = self.buffer.get(second)?.as_number()?;
        let third = self.buffer.next(second)?;
        let operator = self.buffer.get(third)?.as_operator()?;
        Some((lhs, rhs, operator, second, third))
    }
}
