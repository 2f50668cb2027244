//! The dispatch engine: `AGENT_THREAD_COUNT` FIFO lanes hash-partitioned
//! by job id, so every RPC for one job is strictly ordered (launch
//! before signal before kill, see `dispatch::RpcRank`) while unrelated
//! jobs proceed independently. Generalizes `submerge-net`'s `Node` (one
//! peer, one sequence-numbered request table) into a multi-node
//! fan-out driver. `pop_ready`/`report` are split apart, rather than a
//! single `send`-and-interpret call, so a caller can hold the engine's
//! lock only to pop a task and again only to record its outcome —
//! the actual blocking RPC happens with no lock held. The same split
//! makes the engine deterministic to drive from a test without any
//! real threads: pop, call a mock `Transport` directly, report.

use crate::dispatch::lane_for;
use crate::reply::{classify_reply, interpret, NodeReplyAction};
use crate::retry::RetryQueue;
use crate::task::Task;
use crate::watchdog::Watchdog;
use latticed_base::Result;
use latticed_wire::Envelope;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchResult {
    NodeMadeIdle,
    NodeAlreadyDone,
    NodeNoRespond,
}

pub struct Engine {
    lanes: Vec<VecDeque<Task>>,
    next_lane_to_poll: usize,
    retry: RetryQueue,
    watchdog: Watchdog,
    cancel_flags: HashMap<u64, Arc<AtomicBool>>,
    /// Job ids with a requeued task still outstanding, either waiting
    /// in the retry queue or currently in flight on a worker thread.
    /// A lane must not yield a later-rank task for one of these jobs —
    /// otherwise a retried Launch sitting in the retry queue could be
    /// overtaken by a Signal or Kill for the same job already at the
    /// front of its lane, breaking the per-job RPC ordering guarantee.
    retrying_jobs: HashSet<u64>,
}

impl Engine {
    pub fn new(lane_count: usize) -> Engine {
        Engine {
            lanes: (0..lane_count.max(1)).map(|_| VecDeque::new()).collect(),
            next_lane_to_poll: 0,
            retry: RetryQueue::new(),
            watchdog: Watchdog::new(),
            cancel_flags: HashMap::new(),
            retrying_jobs: HashSet::new(),
        }
    }

    pub fn submit(&mut self, task: Task) {
        let lane = lane_for(task.job_id, self.lanes.len());
        self.lanes[lane].push_back(task);
    }

    /// Returns a handle the caller can flip to cancel every queued and
    /// in-flight RPC for a job. Cheap to call repeatedly; the flag is
    /// created on first use and shared by every later `submit` for the
    /// same job id.
    pub fn cancel_handle(&mut self, job_id: u64) -> Arc<AtomicBool> {
        self.cancel_flags
            .entry(job_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    pub fn cancel(&mut self, job_id: u64) {
        self.cancel_handle(job_id).store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self, job_id: u64) -> bool {
        self.cancel_flags
            .get(&job_id)
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    fn next_candidate(&mut self, now_ms: u64) -> Option<Task> {
        if let Some(task) = self.retry.pop_due(now_ms) {
            return Some(task);
        }
        let lane_count = self.lanes.len();
        for offset in 0..lane_count {
            let idx = (self.next_lane_to_poll + offset) % lane_count;
            let blocked = match self.lanes[idx].front() {
                Some(task) => self.retrying_jobs.contains(&task.job_id),
                None => false,
            };
            if blocked {
                continue;
            }
            if let Some(task) = self.lanes[idx].pop_front() {
                self.next_lane_to_poll = (idx + 1) % lane_count;
                return Some(task);
            }
        }
        None
    }

    /// Pops the next task that should actually be sent: a due retry
    /// first, else the next non-empty lane in round-robin order, never
    /// a lane whose front task belongs to a job with an outstanding
    /// retry. Tasks belonging to a cancelled job are dropped silently
    /// rather than handed back, so the caller never has to
    /// special-case them.
    pub fn pop_ready(&mut self, now_ms: u64) -> Option<Task> {
        loop {
            let task = self.next_candidate(now_ms)?;
            if self.is_cancelled(task.job_id) {
                debug!(job_id = task.job_id, node = %task.node, "dropping task for cancelled job");
                self.retrying_jobs.remove(&task.job_id);
                continue;
            }
            return Some(task);
        }
    }

    pub fn arm_watchdog(&mut self, node: &str, deadline_ms: u64) {
        self.watchdog.arm(node, deadline_ms);
    }

    pub fn disarm_watchdog(&mut self, node: &str) {
        self.watchdog.disarm(node);
    }

    /// Nodes still outstanding past their deadline, per the periodic
    /// `WDOG_POLL` sweep. A defensive backstop: a `Transport` given an
    /// explicit deadline should never let this fire in practice.
    pub fn watchdog_sweep(&mut self, now_ms: u64) -> Vec<String> {
        self.watchdog.sweep(now_ms)
    }

    fn requeue(&mut self, mut task: Task, now_ms: u64) {
        self.retrying_jobs.insert(task.job_id);
        task.attempt += 1;
        self.retry.schedule(task, now_ms);
    }

    /// Interprets a completed send attempt and, on a retryable
    /// outcome, re-queues the task with backoff. Returns the task
    /// unchanged (the requeued copy, if any, is internal) alongside
    /// the node-scoped result. A terminal outcome clears the job's
    /// `retrying_jobs` entry so its lane can yield again.
    pub fn report(&mut self, task: Task, reply: Result<Envelope>, now_ms: u64) -> (Task, DispatchResult) {
        match reply {
            Ok(envelope) => match interpret(classify_reply(&envelope)) {
                NodeReplyAction::MakeNodeIdle => {
                    self.retrying_jobs.remove(&task.job_id);
                    (task, DispatchResult::NodeMadeIdle)
                }
                NodeReplyAction::AlreadyDone => {
                    self.retrying_jobs.remove(&task.job_id);
                    (task, DispatchResult::NodeAlreadyDone)
                }
                NodeReplyAction::MarkNoRespondAndRetry => {
                    self.requeue(task.clone(), now_ms);
                    (task, DispatchResult::NodeNoRespond)
                }
            },
            Err(err) => {
                warn!(node = %task.node, error = %err, "rpc send failed");
                self.requeue(task.clone(), now_ms);
                (task, DispatchResult::NodeNoRespond)
            }
        }
    }

    pub fn retry_queue_len(&self) -> usize {
        self.retry.len()
    }
}
