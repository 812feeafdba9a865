use std::collections::{HashSet, VecDeque};

use crate::model::{OwnerId, Task, TaskId};

/// FIFO of tasks ready for dispatch. Requeued tasks go to the back.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    tasks: VecDeque<Task>,
}

impl ReadyQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, task: Task) {
        self.tasks.push_back(task);
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.tasks.extend(tasks);
    }

    pub fn pop_front(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Oldest task belonging to `owner`.
    pub fn pop_front_for(&mut self, owner: OwnerId) -> Option<Task> {
        let index = self.tasks.iter().position(|task| task.owner_id == owner)?;
        self.tasks.remove(index)
    }

    /// Drop every queued task whose id is in `ids`; returns how many went.
    pub fn remove_all(&mut self, ids: &[TaskId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let ids: HashSet<TaskId> = ids.iter().copied().collect();
        let before = self.tasks.len();
        self.tasks.retain(|task| !ids.contains(&task.id));
        before - self.tasks.len()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::calc::Operator;
    use crate::model::ExpressionId;

    fn task(id: u64, owner: u64) -> Task {
        Task {
            id: TaskId(id),
            arg1: "1".into(),
            arg2: "2".into(),
            operation: Operator::Add,
            operation_time: Duration::ZERO,
            owner_id: OwnerId(owner),
            expression_id: ExpressionId(1),
        }
    }

    #[test]
    fn fifo_order() {
        let mut queue = ReadyQueue::new();
        queue.extend([task(1, 0), task(2, 0)]);
        queue.push_back(task(3, 0));

        let ids: Vec<u64> = std::iter::from_fn(|| queue.pop_front())
            .map(|t| t.id.0)
            .collect();
        assert_eq!(ids, [1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn pop_for_owner_skips_others() {
        let mut queue = ReadyQueue::new();
        queue.extend([task(1, 1), task(2, 2), task(3, 2)]);

        assert_eq!(queue.pop_front_for(OwnerId(2)).unwrap().id, TaskId(2));
        assert!(queue.pop_front_for(OwnerId(9)).is_none());
        assert_eq!(queue.pop_front().unwrap().id, TaskId(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_all_purges_ids() {
        let mut queue = ReadyQueue::new();
        queue.extend([task(1, 0), task(2, 0), task(3, 0)]);

        assert_eq!(queue.remove_all(&[TaskId(1), TaskId(3), TaskId(8)]), 2);
        assert_eq!(queue.pop_front().unwrap().id, TaskId(2));
        assert_eq!(queue.remove_all(&[]), 0);
    }
}
