use crate::{JobState, Scheduler, SubmitRequest};
use latticed_assoc::{AssocTree, InMemoryAccountingStore};
use latticed_cred::CredentialSigner;
use latticed_nodes::{ConfigRecord, Partition, ResourceTable};
use rand::rngs::OsRng;
use std::sync::Arc;
use test_log::test;

fn one_node_table() -> ResourceTable {
    let table = ResourceTable::new();
    let config = ConfigRecord {
        boards: 1,
        sockets: 1,
        cores: 4,
        threads: 1,
        real_memory_mb: 4096,
        tmp_disk_mb: 0,
        feature_set: Vec::new(),
        gres: String::new(),
    };
    let nodes = table.register_node_pattern("n0", 7003, 1, config).unwrap();
    let mut partition = Partition::new("batch");
    partition.nodes = nodes;
    partition.is_default = true;
    table.add_partition(partition);
    table
}

fn running_job() -> (Scheduler, ResourceTable, u64) {
    let table = one_node_table();
    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);
    let job_id = sched
        .submit(
            &table,
            &assoc_tree,
            SubmitRequest {
                user: "alice".to_string(),
                assoc: assoc_tree.root(),
                partition: "batch".to_string(),
                requested_cpus: 2,
                contiguous: true,
                features: Vec::new(),
                node_list: None,
                exclude_list: None,
                time_limit_minutes: Some(10),
            },
            1_000,
        )
        .unwrap();
    let placements = sched.schedule_once(&table).unwrap();
    assert_eq!(placements.len(), 1);
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Running);
    (sched, table, job_id)
}

#[test]
fn suspend_and_resume_accumulate_pause_time() {
    let (mut sched, _table, job_id) = running_job();
    sched.suspend(job_id, 2_000).unwrap();
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Suspended);
    sched.resume(job_id, 2_500).unwrap();
    let job = sched.get(job_id).unwrap();
    assert_eq!(job.state, JobState::Running);
    assert_eq!(job.suspended_accum_ms, 500);
    assert!(job.suspended_at_ms.is_none());
}

#[test]
fn kill_signal_moves_job_toward_completion() {
    let (mut sched, _table, job_id) = running_job();
    sched.signal(job_id, 9).unwrap();
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Completing);
    assert!(sched.maybe_complete(job_id, true, true, 3_000).unwrap());
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Completed);
}

#[test]
fn non_kill_signal_only_sets_the_flag() {
    let (mut sched, _table, job_id) = running_job();
    sched.signal(job_id, 1).unwrap();
    let job = sched.get(job_id).unwrap();
    assert_eq!(job.state, JobState::Running);
    assert!(job.flags.signaling);
    sched.ack_signal(job_id).unwrap();
    assert!(!sched.get(job_id).unwrap().flags.signaling);
}

#[test]
fn time_limit_breach_is_terminal_and_returns_allocated_nodes() {
    let (mut sched, _table, job_id) = running_job();
    let nodes = sched.time_limit_breach(job_id, 5_000).unwrap();
    assert_eq!(nodes, vec![latticed_nodes::NodeIdx(0)]);
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Timeout);
    assert!(sched.get(job_id).unwrap().state.is_terminal());
}

#[test]
fn terminal_states_absorb_further_transitions() {
    let (mut sched, _table, job_id) = running_job();
    sched.time_limit_breach(job_id, 5_000).unwrap();
    let err = sched.signal(job_id, 9).unwrap_err();
    assert_eq!(err.kind(), latticed_base::ErrorKind::AlreadyDone);
    let err = sched.suspend(job_id, 5_100).unwrap_err();
    assert_eq!(err.kind(), latticed_base::ErrorKind::InvalidInput);
}

#[test]
fn node_fail_without_requeue_is_terminal() {
    let (mut sched, _table, job_id) = running_job();
    sched.node_fail(job_id, false, 6_000).unwrap();
    let job = sched.get(job_id).unwrap();
    assert_eq!(job.state, JobState::NodeFail);
    assert!(job.state.is_terminal());
}

#[test]
fn node_fail_with_requeue_returns_job_to_pending() {
    let (mut sched, _table, job_id) = running_job();
    sched.node_fail(job_id, true, 6_000).unwrap();
    let job = sched.get(job_id).unwrap();
    assert_eq!(job.state, JobState::Pending);
    assert!(job.flags.requeue);
    assert!(job.node_bitmap().unwrap().unwrap().popcount() == 0);
}

#[test]
fn prolog_failure_without_requeue_fails_the_job() {
    let (mut sched, _table, job_id) = running_job();
    let action = sched
        .handle_launch_reply(
            job_id,
            Some(latticed_nodes::NodeIdx(0)),
            crate::LaunchReplyOutcome::PrologFailed,
            false,
            7_000,
        )
        .unwrap();
    assert_eq!(action, crate::LaunchReplyAction::MarkNodeDown);
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Failed);
}

#[test]
fn invalid_job_id_reply_is_a_no_op_for_the_job() {
    let (mut sched, _table, job_id) = running_job();
    let action = sched
        .handle_launch_reply(job_id, None, crate::LaunchReplyOutcome::InvalidJobId, false, 7_000)
        .unwrap();
    assert_eq!(action, crate::LaunchReplyAction::NodeAlreadyDone);
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Running);
}

#[test]
fn cancel_pending_job_is_immediately_cancelled() {
    let table = one_node_table();
    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);
    let job_id = sched
        .submit(
            &table,
            &assoc_tree,
            SubmitRequest {
                user: "alice".to_string(),
                assoc: assoc_tree.root(),
                partition: "batch".to_string(),
                requested_cpus: 100,
                contiguous: true,
                features: Vec::new(),
                node_list: None,
                exclude_list: None,
                time_limit_minutes: None,
            },
            1_000,
        )
        .unwrap();
    sched.cancel(job_id, 1_500).unwrap();
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Cancelled);
}
