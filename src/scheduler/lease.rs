//! Lease table: tasks handed to a worker, each with a deadline.
//!
//! Deadlines live in a min-heap. Releasing a lease leaves its heap entry
//! behind; entries whose grant number no longer matches a live lease are
//! skipped when they surface.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tokio::time::Instant;

use crate::model::{Task, TaskId};

#[derive(Debug, Clone)]
pub struct Lease {
    pub task: Task,
    pub deadline: Instant,
    /// Agent id reported by the puller, or "anonymous".
    pub holder: String,
    grant: u64,
}

#[derive(Debug, Default)]
pub struct LeaseTable {
    leases: HashMap<TaskId, Lease>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, TaskId)>>,
    grants: u64,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease `task` to `holder` until `deadline`, replacing any earlier lease.
    pub fn grant(&mut self, task: Task, deadline: Instant, holder: impl Into<String>) {
        self.grants += 1;
        let id = task.id;
        self.deadlines.push(Reverse((deadline, self.grants, id)));
        self.leases.insert(
            id,
            Lease {
                task,
                deadline,
                holder: holder.into(),
                grant: self.grants,
            },
        );
    }

    pub fn is_leased(&self, id: TaskId) -> bool {
        self.leases.contains_key(&id)
    }

    pub fn release(&mut self, id: TaskId) -> Option<Lease> {
        let lease = self.leases.remove(&id);
        self.compact();
        lease
    }

    /// Remove and return every lease whose deadline is at or before `now`,
    /// earliest first.
    pub fn expire_due(&mut self, now: Instant) -> Vec<Lease> {
        let mut expired = Vec::new();
        while let Some(Reverse((deadline, grant, id))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if self.leases.get(&id).is_some_and(|lease| lease.grant == grant) {
                expired.extend(self.leases.remove(&id));
            }
        }
        expired
    }

    /// Earliest deadline among live leases.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, grant, id))) = self.deadlines.peek().copied() {
            if self.leases.get(&id).is_some_and(|lease| lease.grant == grant) {
                return Some(deadline);
            }
            self.deadlines.pop();
        }
        None
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }

    // Stale entries otherwise accumulate while deadlines are far away.
    fn compact(&mut self) {
        if self.deadlines.len() > 2 * self.leases.len() + 64 {
            let leases = &self.leases;
            self.deadlines
                .retain(|Reverse((_, grant, id))| leases.get(id).is_some_and(|l| l.grant == *grant));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::calc::Operator;
    use crate::model::{ExpressionId, OwnerId};

    fn task(id: u64) -> Task {
        Task {
            id: TaskId(id),
            arg1: "1".into(),
            arg2: "2".into(),
            operation: Operator::Add,
            operation_time: Duration::ZERO,
            owner_id: OwnerId(0),
            expression_id: ExpressionId(1),
        }
    }

    #[test]
    fn expires_in_deadline_order() {
        let now = Instant::now();
        let mut table = LeaseTable::new();
        table.grant(task(1), now + Duration::from_secs(3), "a");
        table.grant(task(2), now + Duration::from_secs(1), "b");
        table.grant(task(3), now + Duration::from_secs(10), "c");

        assert_eq!(table.next_deadline(), Some(now + Duration::from_secs(1)));

        let expired = table.expire_due(now + Duration::from_secs(5));
        let ids: Vec<u64> = expired.iter().map(|l| l.task.id.0).collect();
        assert_eq!(ids, [2, 1]);
        assert_eq!(expired[0].holder, "b");
        assert_eq!(table.len(), 1);
        assert!(table.is_leased(TaskId(3)));
    }

    #[test]
    fn released_lease_never_expires() {
        let now = Instant::now();
        let mut table = LeaseTable::new();
        table.grant(task(1), now + Duration::from_secs(1), "a");

        assert!(table.release(TaskId(1)).is_some());
        assert!(table.release(TaskId(1)).is_none());
        assert!(table.expire_due(now + Duration::from_secs(2)).is_empty());
        assert_eq!(table.next_deadline(), None);
    }

    #[test]
    fn regrant_supersedes_old_deadline() {
        let now = Instant::now();
        let mut table = LeaseTable::new();
        table.grant(task(1), now + Duration::from_secs(1), "a");
        table.grant(task(1), now + Duration::from_secs(5), "b");

        assert!(table.expire_due(now + Duration::from_secs(2)).is_empty());
        assert_eq!(table.next_deadline(), Some(now + Duration::from_secs(5)));

        let expired = table.expire_due(now + Duration::from_secs(5));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].holder, "b");
    }

    #[test]
    fn heap_is_compacted() {
        let now = Instant::now();
        let mut table = LeaseTable::new();
        for id in 0..200 {
            table.grant(task(id), now + Duration::from_secs(60), "a");
            table.release(TaskId(id));
        }
        assert!(table.is_empty());
        assert!(table.deadlines.len() <= 64 + 1);
    }
}
