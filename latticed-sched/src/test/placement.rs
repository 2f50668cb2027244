use crate::{JobState, Scheduler, SubmitRequest};
use latticed_assoc::{AssocTree, InMemoryAccountingStore};
use latticed_cred::CredentialSigner;
use latticed_nodes::{ConfigRecord, Partition, ResourceTable};
use rand::rngs::OsRng;
use std::sync::Arc;
use test_log::test;

fn ten_node_table() -> ResourceTable {
    let table = ResourceTable::new();
    let config = ConfigRecord {
        boards: 1,
        sockets: 1,
        cores: 4,
        threads: 1,
        real_memory_mb: 8192,
        tmp_disk_mb: 0,
        feature_set: Vec::new(),
        gres: String::new(),
    };
    let nodes = table.register_node_pattern("node[00-09]", 7003, 1, config).unwrap();
    let mut partition = Partition::new("batch");
    partition.nodes = nodes;
    partition.is_default = true;
    table.add_partition(partition);
    table
}

fn submit_request(assoc: latticed_assoc::AssocId, requested_cpus: u32, contiguous: bool) -> SubmitRequest {
    SubmitRequest {
        user: "alice".to_string(),
        assoc,
        partition: "batch".to_string(),
        requested_cpus,
        contiguous,
        features: Vec::new(),
        node_list: None,
        exclude_list: None,
        time_limit_minutes: Some(30),
    }
}

/// 10 nodes x 4 CPUs, one job requesting 8 CPUs `--contiguous` lands
/// on the first two nodes and the credential's node list names them.
#[test]
fn contiguous_job_selects_lowest_indices() {
    let table = ten_node_table();
    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);

    let job_id = sched
        .submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 8, true), 1_000)
        .unwrap();

    let placements = sched.schedule_once(&table).unwrap();
    assert_eq!(placements.len(), 1);
    let placement = &placements[0];
    assert_eq!(placement.job_id, job_id);
    assert_eq!(placement.selected_nodes, vec![latticed_nodes::NodeIdx(0), latticed_nodes::NodeIdx(1)]);
    assert_eq!(placement.node_list, "node[00-01]");
    assert_eq!(placement.batch_host, latticed_nodes::NodeIdx(0));

    let job = sched.get(job_id).unwrap();
    assert_eq!(job.state, JobState::Running);
    assert_eq!(table.with_node(latticed_nodes::NodeIdx(0), |n| n.state.base).unwrap(), latticed_nodes::BaseState::Allocated);

    assert_eq!(placement.signed_credential.credential.node_list, "node[00-01]");
    assert_eq!(placement.signed_credential.credential.job_id, job_id);
}

#[test]
fn job_exceeding_association_cpu_limit_is_rejected() {
    let table = ten_node_table();
    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let mut assoc_tree = AssocTree::new("cluster0", store);
    assoc_tree
        .modify(assoc_tree.root(), |a| a.limits.max_cpus = Some(4), 1_000, "admin")
        .unwrap();
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);

    let err = sched
        .submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 8, true), 1_000)
        .unwrap_err();
    assert_eq!(err.kind(), latticed_base::ErrorKind::ConstraintViolation);
}

#[test]
fn jobs_that_dont_fit_stay_pending() {
    let table = ten_node_table();
    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);

    // 11 nodes' worth of CPUs requested on a 10-node cluster.
    let job_id = sched
        .submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 44, true), 1_000)
        .unwrap();

    let placements = sched.schedule_once(&table).unwrap();
    assert!(placements.is_empty());
    assert_eq!(sched.get(job_id).unwrap().state, JobState::Pending);
}

fn node_with_weight(table: &ResourceTable, name: &str, weight: u32) -> latticed_nodes::NodeIdx {
    let config = ConfigRecord {
        boards: 1,
        sockets: 1,
        cores: 4,
        threads: 1,
        real_memory_mb: 8192,
        tmp_disk_mb: 0,
        feature_set: Vec::new(),
        gres: String::new(),
    };
    table
        .register_node(name.to_string(), name.to_string(), name.to_string(), 7003, weight, config)
        .unwrap()
}

/// Non-contiguous packing picks the lowest-weight idle node first,
/// even when it has a higher node index than a heavier alternative.
#[test]
fn non_contiguous_job_prefers_lower_weight_over_lower_index() {
    let table = ResourceTable::new();
    node_with_weight(&table, "heavy0", 100);
    let light1 = node_with_weight(&table, "light1", 1);
    let mut partition = Partition::new("batch");
    partition.nodes = vec![latticed_nodes::NodeIdx(0), light1];
    partition.is_default = true;
    table.add_partition(partition);

    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);

    sched.submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 4, false), 1_000).unwrap();
    let placements = sched.schedule_once(&table).unwrap();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].selected_nodes, vec![light1]);
}

/// Contiguous packing breaks a tie between two equal-length idle runs
/// by total run weight, not by which run starts at the lower index.
#[test]
fn contiguous_job_prefers_lower_weight_run_over_lower_index_run() {
    let table = ResourceTable::new();
    node_with_weight(&table, "heavy0", 50);
    node_with_weight(&table, "heavy1", 50);
    let light2 = node_with_weight(&table, "light2", 1);
    let light3 = node_with_weight(&table, "light3", 1);
    let mut partition = Partition::new("batch");
    partition.nodes =
        vec![latticed_nodes::NodeIdx(0), latticed_nodes::NodeIdx(1), light2, light3];
    partition.is_default = true;
    table.add_partition(partition);

    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);

    sched.submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 8, true), 1_000).unwrap();
    let placements = sched.schedule_once(&table).unwrap();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].selected_nodes, vec![light2, light3]);
}

#[test]
fn higher_priority_job_is_placed_first() {
    let table = ten_node_table();
    let store: Arc<dyn latticed_assoc::AccountingStore> = Arc::new(InMemoryAccountingStore::new());
    let assoc_tree = AssocTree::new("cluster0", store);
    let signer = CredentialSigner::generate(&mut OsRng);
    let mut sched = Scheduler::new(1, signer);

    // Both jobs want all ten nodes; only one can run.
    let low = sched
        .submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 40, true), 1_000)
        .unwrap();
    let high = sched
        .submit(&table, &assoc_tree, submit_request(assoc_tree.root(), 40, true), 1_001)
        .unwrap();
    sched.set_priority(high, 100.0).unwrap();

    let placements = sched.schedule_once(&table).unwrap();
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].job_id, high);
    assert_eq!(sched.get(low).unwrap().state, JobState::Pending);
}
