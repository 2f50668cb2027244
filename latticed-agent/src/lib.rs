//! Fans controller RPCs out to node daemons and interprets their
//! replies at the node-scoped level. Generalizes `submerge-net`'s
//! single-peer `Node`/`Msg` request tracking into a worker pool that
//! dispatches to many nodes concurrently while still guaranteeing, per
//! job, that a launch reaches a node before any signal or kill that
//! was queued after it (`dispatch::RpcRank`).
//!
//! Job-scoped outcomes (prolog/epilog failure, a job id the node no
//! longer recognizes) are not this crate's concern: they're read off
//! the same reply stream by `latticed_sched::Scheduler::handle_launch_reply`.
//! This crate only ever decides what a node's reply means for that
//! node — make it idle, leave it alone, mark it unresponsive and retry.

mod dispatch;
mod engine;
mod pool;
mod reply;
mod retry;
mod task;
mod transport;
mod watchdog;

#[cfg(test)]
mod test;

pub use dispatch::{lane_for, rank_of, RpcRank, DEFAULT_THREAD_COUNT};
pub use engine::{DispatchResult, Engine};
pub use pool::{WorkerPool, COMMAND_TIMEOUT, WDOG_POLL};
pub use reply::{classify_reply, interpret, NodeReplyAction, NodeReplyOutcome};
pub use retry::{backoff_ms, RetryQueue};
pub use task::Task;
pub use transport::Transport;
pub use watchdog::Watchdog;
