use latticed_wire::RpcBody;

/// Default worker thread count, matching `AGENT_THREAD_COUNT`.
pub const DEFAULT_THREAD_COUNT: usize = 10;

/// Ordering class an RPC belongs to for a given job. Every RPC for one
/// job must reach its node no later, relative to other RPCs for that
/// same job, than its rank here — launch before signal before kill.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum RpcRank {
    Launch,
    Signal,
    Kill,
}

pub fn rank_of(body: &RpcBody) -> RpcRank {
    match body {
        RpcBody::BatchJobLaunch { .. } | RpcBody::LaunchTasks { .. } => RpcRank::Launch,
        RpcBody::SignalTasks { .. } => RpcRank::Signal,
        RpcBody::TerminateTasks { .. } | RpcBody::KillJob { .. } | RpcBody::KillTimelimit { .. } => {
            RpcRank::Kill
        }
        RpcBody::NodeRegistrationStatus { .. }
        | RpcBody::Ping
        | RpcBody::Reconfigure
        | RpcBody::JobNotify { .. }
        | RpcBody::Shutdown
        | RpcBody::SlurmRc { .. } => RpcRank::Launch,
    }
}

/// Hash-partitions a job onto one of `lane_count` FIFO lanes. Every
/// RPC for the same job lands on the same lane, so a single-threaded
/// consumer of that lane preserves submission order for the job
/// without any cross-lane coordination.
pub fn lane_for(job_id: u64, lane_count: usize) -> usize {
    (job_id as usize) % lane_count.max(1)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn rank_orders_launch_before_signal_before_kill() {
        assert!(RpcRank::Launch < RpcRank::Signal);
        assert!(RpcRank::Signal < RpcRank::Kill);
    }

    #[test]
    fn lane_for_is_stable_per_job() {
        assert_eq!(lane_for(42, 10), lane_for(42, 10));
        assert_eq!(lane_for(42, 10), 2);
    }
}
