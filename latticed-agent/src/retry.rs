use crate::task::Task;

const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 30_000;

/// Exponential backoff, capped, keyed only by attempt count — the
/// retry queue below keys the schedule by `(node, rpc)` naturally,
/// since each `Task` already carries both.
pub fn backoff_ms(attempt: u32) -> u64 {
    let shift = attempt.min(7);
    (BASE_BACKOFF_MS * (1u64 << shift)).min(MAX_BACKOFF_MS)
}

#[derive(Clone, Debug)]
struct Scheduled {
    due_ms: u64,
    task: Task,
}

/// Tasks awaiting a retry, kept sorted by due time so the next one to
/// fire is always at the front.
#[derive(Default)]
pub struct RetryQueue {
    entries: Vec<Scheduled>,
}

impl RetryQueue {
    pub fn new() -> RetryQueue {
        RetryQueue::default()
    }

    pub fn schedule(&mut self, task: Task, now_ms: u64) {
        let due_ms = now_ms + backoff_ms(task.attempt);
        let pos = self.entries.partition_point(|e| e.due_ms <= due_ms);
        self.entries.insert(pos, Scheduled { due_ms, task });
    }

    /// Pops the single earliest entry if its due time has passed.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<Task> {
        match self.entries.first() {
            Some(entry) if entry.due_ms <= now_ms => Some(self.entries.remove(0).task),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use latticed_wire::{JobId, RpcBody};
    use test_log::test;

    fn task() -> Task {
        Task::new(1, "n0", RpcBody::KillJob { job_id: JobId::simple(1), hurry: false })
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_ms(0), BASE_BACKOFF_MS);
        assert!(backoff_ms(1) > backoff_ms(0));
        assert_eq!(backoff_ms(20), MAX_BACKOFF_MS);
    }

    #[test]
    fn pop_due_waits_for_the_deadline() {
        let mut q = RetryQueue::new();
        q.schedule(task(), 1_000);
        assert!(q.pop_due(1_000).is_none());
        assert!(q.pop_due(1_000 + BASE_BACKOFF_MS).is_some());
        assert!(q.is_empty());
    }

    #[test]
    fn entries_stay_sorted_by_due_time() {
        let mut q = RetryQueue::new();
        let mut late = task();
        late.attempt = 5;
        q.schedule(late, 1_000);
        let soon = task();
        q.schedule(soon, 1_000);
        assert_eq!(q.len(), 2);
        let first = q.pop_due(1_000 + MAX_BACKOFF_MS).unwrap();
        assert_eq!(first.attempt, 0);
    }
}
