//! The controller: owns every RW-locked table, the scheduler, the
//! association tree, and the agent fan-out pool, and is the only
//! place in this workspace that ties them together behind one RPC
//! entry point. There is exactly one controller per process — unlike
//! `submerge`'s active/passive replica split, this workspace's
//! federation story (spec §9) is out of scope, so no
//! interchangeable-implementation trait is worth the indirection; a
//! concrete struct is what the single real implementation needs.

use crate::config::Config;
use crate::locks::{LockGuard, LockRank};
use crate::net::TcpTransport;
use crate::snapshot;
use latticed_agent::{DispatchResult, Engine, Task, Transport, WorkerPool};
use latticed_assoc::{AccountingStore, AssocTree, InMemoryAccountingStore, NewAssociation};
use latticed_base::{invalid_input, not_found, Bitmap, Result};
use latticed_cred::{CredentialSigner, SignedCredential, StepId as CredStepId};
use latticed_nodes::{ConfigRecord, NodeIdx, Partition, ResourceTable};
use latticed_sched::{LaunchReplyOutcome, Scheduler, SubmitRequest};
use latticed_wire::{Envelope, JobId, NodeCredentialWire, PackedBitmap, RpcBody, StepId as WireStepId};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControllerPhase {
    Starting,
    Running,
    Draining,
    Stopped,
}

pub struct Controller {
    config: RwLock<Config>,
    nodes: Arc<ResourceTable>,
    jobs: Arc<RwLock<Scheduler>>,
    assoc: Mutex<AssocTree>,
    agents: Mutex<Option<WorkerPool>>,
    phase: Mutex<ControllerPhase>,
    state_dir: PathBuf,
}

fn now_unix_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn now_unix_s() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

fn decode_seed_hex(hex: &str) -> Result<[u8; 32]> {
    if hex.len() != 64 {
        return Err(invalid_input("signing_key_seed_hex must be 64 hex characters"));
    }
    let mut out = [0u8; 32];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| invalid_input("signing_key_seed_hex is not valid hex"))?;
    }
    Ok(out)
}

fn to_wire_step_id(step: CredStepId) -> WireStepId {
    match step {
        CredStepId::BatchScript => WireStepId::BatchScript,
        CredStepId::Interactive => WireStepId::Interactive,
        CredStepId::Extern => WireStepId::Extern,
        CredStepId::Id(id) => WireStepId::Id(id),
    }
}

fn to_wire_credential(signed: &SignedCredential) -> NodeCredentialWire {
    let c = &signed.credential;
    NodeCredentialWire {
        job_id: JobId::simple(c.job_id),
        step_id: to_wire_step_id(c.step_id),
        uid: c.uid,
        gid: c.gid,
        node_list: c.node_list.clone(),
        core_bitmaps_per_node: c
            .core_bitmaps_per_node
            .iter()
            .map(|(bit_count, word_count, words)| PackedBitmap {
                bit_count: *bit_count,
                word_count: *word_count,
                words: words.clone(),
            })
            .collect(),
        memory_per_node: c.memory_per_node.clone(),
        expiration_unix_ms: c.expiration_unix_ms,
        signature: signed.signature.clone(),
    }
}

/// A bitmap with a bit set for every node selected by a placement,
/// standing in for true per-core allocation: `latticed_sched`'s own
/// `Credential::core_bitmaps_per_node` is still an all-zero placeholder
/// at this point, so a node-selection bitmap is the most meaningful
/// thing `cpu_bitmap` can carry without inventing per-core packing
/// logic this workspace doesn't have yet.
fn node_selection_bitmap(selected: &[NodeIdx], node_count: usize) -> PackedBitmap {
    let mut bitmap = Bitmap::alloc(node_count);
    for idx in selected {
        bitmap.set(idx.0 as usize);
    }
    PackedBitmap::from(&bitmap)
}

/// Bridges the agent pool's node-scoped dispatch outcome into both the
/// node table (always) and, for a launch-class RPC, the job-scoped
/// launch-reply handling `latticed_sched` owns. `PrologFailed` and
/// `EpilogFailed` can't be produced here: this workspace's `SlurmRc`
/// reply only carries a generic numeric code, with no dedicated wire
/// error for a failed prolog or epilog distinct from a plain timeout.
fn handle_dispatch_outcome(
    nodes: &ResourceTable,
    jobs: &RwLock<Scheduler>,
    requeue_on_node_fail: bool,
    task: Task,
    outcome: DispatchResult,
) {
    let now = now_unix_ms();
    {
        let _guard = LockGuard::acquire(LockRank::Nodes);
        if let Some(idx) = nodes.lookup_by_name(&task.node) {
            let result = match outcome {
                DispatchResult::NodeMadeIdle | DispatchResult::NodeAlreadyDone => nodes.record_response(idx, now),
                DispatchResult::NodeNoRespond => nodes.mark_no_respond(idx),
            };
            if let Err(err) = result {
                warn!(node = %task.node, error = %err, "failed to record dispatch outcome on node table");
            }
        }
    }

    if matches!(task.body, RpcBody::BatchJobLaunch { .. } | RpcBody::LaunchTasks { .. }) {
        let launch_outcome = match outcome {
            DispatchResult::NodeMadeIdle => LaunchReplyOutcome::Success,
            DispatchResult::NodeAlreadyDone => LaunchReplyOutcome::InvalidJobId,
            DispatchResult::NodeNoRespond => LaunchReplyOutcome::NoResponse,
        };
        let failed_node = nodes.lookup_by_name(&task.node);
        let _guard = LockGuard::acquire(LockRank::Jobs);
        let mut sched = jobs.write().unwrap();
        match sched.handle_launch_reply(task.job_id, failed_node, launch_outcome, requeue_on_node_fail, now) {
            Ok(action) => debug!(job_id = task.job_id, node = %task.node, ?action, "launch reply handled"),
            Err(err) => warn!(job_id = task.job_id, node = %task.node, error = %err, "failed to record launch reply"),
        }
    }
}

impl Controller {
    pub fn new(config: Config) -> Result<Controller> {
        let state_dir = PathBuf::from(&config.state_dir);

        let nodes = Arc::new(ResourceTable::new());
        for nc in &config.nodes {
            let record = ConfigRecord {
                boards: nc.boards,
                sockets: nc.sockets,
                cores: nc.cores,
                threads: nc.threads,
                real_memory_mb: nc.real_memory_mb,
                tmp_disk_mb: nc.tmp_disk_mb,
                feature_set: nc.features.clone(),
                gres: nc.gres.clone(),
            };
            nodes.register_node_pattern(&nc.hosts, nc.port, nc.weight, record)?;
        }
        for pc in &config.partitions {
            let names = latticed_base::hostlist_expand(&pc.nodes)?;
            let idxs = names
                .iter()
                .map(|n| {
                    nodes
                        .lookup_by_name(n)
                        .ok_or_else(|| not_found(format!("partition {} names unknown node {n}", pc.name)))
                })
                .collect::<Result<Vec<_>>>()?;
            nodes.add_partition(Partition {
                name: pc.name.clone(),
                nodes: idxs,
                max_job_nodes: pc.max_job_nodes,
                max_time_minutes: pc.max_time_minutes,
                allow_groups: None,
                deny_groups: None,
                is_default: pc.is_default,
            });
        }
        if let Some((_, node_states)) = snapshot::load_node_state(&state_dir)? {
            for (name, state) in node_states {
                nodes.restore_node_state(&name, state);
            }
        }

        let store: Arc<dyn AccountingStore> = Arc::new(InMemoryAccountingStore::new());
        let mut assoc = match snapshot::load_assoc_mgr_state(&state_dir)? {
            Some((_, records)) => AssocTree::restore(records, store.clone()),
            None => AssocTree::new(config.cluster_name.clone(), store.clone()),
        };
        let seed_time = now_unix_ms();
        // Every seed hangs directly off the cluster root: this config
        // format names no account parentage beyond that, a simpler
        // shape than the full coordinator/sub-account hierarchy
        // `latticed-assoc` can otherwise represent.
        for seed in &config.associations {
            let base = match &seed.user {
                Some(user) => NewAssociation::user(config.cluster_name.clone(), seed.account.clone(), user.clone()),
                None => NewAssociation::account(config.cluster_name.clone(), seed.account.clone()),
            };
            let new_assoc = NewAssociation {
                is_default: seed.is_default,
                limits: latticed_assoc::Limits { max_cpus: seed.max_cpus, max_jobs: seed.max_jobs, ..Default::default() },
                ..base
            };
            let root = assoc.root();
            assoc.add(root, new_assoc, seed_time, "config")?;
        }

        let signer = match &config.signing_key_seed_hex {
            Some(hex) => CredentialSigner::from_bytes(&decode_seed_hex(hex)?),
            None => CredentialSigner::generate(&mut rand::thread_rng()),
        };

        let jobs = match snapshot::load_job_state(&state_dir)? {
            Some((_, restored)) => {
                let min_ms = restored
                    .iter()
                    .map(|j| latticed_base::unix_ms_of(j.id))
                    .max()
                    .unwrap_or(0)
                    .max(seed_time);
                Scheduler::restore(config.cluster_id, signer, min_ms, restored)
            }
            None => Scheduler::new(config.cluster_id, signer),
        };
        let jobs = Arc::new(RwLock::new(jobs));

        let requeue_on_node_fail = config.requeue_on_node_fail;
        let outcome_nodes = nodes.clone();
        let outcome_jobs = jobs.clone();
        let on_outcome = move |task: Task, outcome: DispatchResult| {
            handle_dispatch_outcome(&outcome_nodes, &outcome_jobs, requeue_on_node_fail, task, outcome);
        };

        let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new(nodes.clone()));
        let engine = Engine::new(config.agent_thread_count);
        let agents = WorkerPool::spawn(engine, config.agent_thread_count, transport, on_outcome);

        Ok(Controller {
            config: RwLock::new(config),
            nodes,
            jobs,
            assoc: Mutex::new(assoc),
            agents: Mutex::new(Some(agents)),
            phase: Mutex::new(ControllerPhase::Starting),
            state_dir,
        })
    }

    pub fn phase(&self) -> ControllerPhase {
        *self.phase.lock().unwrap()
    }

    pub fn mark_running(&self) {
        *self.phase.lock().unwrap() = ControllerPhase::Running;
    }

    pub fn submit_job(&self, req: SubmitRequest, now_ms: u64) -> Result<u64> {
        let assoc = self.assoc.lock().unwrap();
        let _jobs_guard = LockGuard::acquire(LockRank::Jobs);
        let _nodes_guard = LockGuard::acquire(LockRank::Nodes);
        let mut sched = self.jobs.write().unwrap();
        sched.submit(&self.nodes, &assoc, req, now_ms)
    }

    fn cancel_internal(&self, job_id: u64, now_ms: u64) -> Result<Vec<NodeIdx>> {
        let _guard = LockGuard::acquire(LockRank::Jobs);
        let mut sched = self.jobs.write().unwrap();
        sched.cancel(job_id, now_ms)?;
        Ok(sched.get(job_id).map(|j| j.allocated_nodes()).unwrap_or_default())
    }

    fn fan_out_to_nodes(&self, job_id: u64, idxs: &[NodeIdx], body_for: impl Fn(u64) -> RpcBody) -> Result<()> {
        let _guard = LockGuard::acquire(LockRank::Nodes);
        let agents = self.agents.lock().unwrap();
        let Some(agents) = agents.as_ref() else {
            return Err(latticed_base::err(latticed_base::ErrorKind::Shutdown, "controller is shutting down"));
        };
        for idx in idxs {
            let name = self.nodes.with_node(*idx, |n| n.name.clone())?;
            agents.submit(Task::new(job_id, name, body_for(job_id)));
        }
        Ok(())
    }

    pub fn cancel_job(&self, job_id: u64, hurry: bool, now_ms: u64) -> Result<()> {
        let allocated = self.cancel_internal(job_id, now_ms)?;
        self.fan_out_to_nodes(job_id, &allocated, move |id| RpcBody::KillJob { job_id: JobId::simple(id), hurry })
    }

    /// Batch-step-only termination (`scancel -b`). `latticed-sched`'s
    /// `Job` models no per-step state, so at the controller level this
    /// is the same job-wide cancel as `cancel_job`; only the RPC it
    /// fans out to the node differs.
    pub fn terminate_batch_step(&self, job_id: u64, now_ms: u64) -> Result<()> {
        let allocated = self.cancel_internal(job_id, now_ms)?;
        self.fan_out_to_nodes(job_id, &allocated, |id| RpcBody::TerminateTasks {
            job_id: JobId::simple(id),
            step_id: WireStepId::BatchScript,
        })
    }

    pub fn signal_job(&self, job_id: u64, signal: i32, now_ms: u64) -> Result<()> {
        let allocated = {
            let _guard = LockGuard::acquire(LockRank::Jobs);
            let mut sched = self.jobs.write().unwrap();
            sched.signal(job_id, signal)?;
            sched.get(job_id).map(|j| j.allocated_nodes()).unwrap_or_default()
        };
        self.fan_out_to_nodes(job_id, &allocated, move |id| RpcBody::SignalTasks {
            job_id: JobId::simple(id),
            step_id: WireStepId::BatchScript,
            signal,
        })
    }

    pub fn time_limit_breach(&self, job_id: u64, now_ms: u64) -> Result<()> {
        let allocated = {
            let _guard = LockGuard::acquire(LockRank::Jobs);
            let mut sched = self.jobs.write().unwrap();
            sched.time_limit_breach(job_id, now_ms)?
        };
        self.fan_out_to_nodes(job_id, &allocated, |id| RpcBody::KillTimelimit { job_id: JobId::simple(id) })
    }

    pub fn schedule_tick(&self, now_ms: u64) -> Result<usize> {
        let _jobs_guard = LockGuard::acquire(LockRank::Jobs);
        let _nodes_guard = LockGuard::acquire(LockRank::Nodes);
        let placements = {
            let mut sched = self.jobs.write().unwrap();
            sched.schedule_once(&self.nodes)?
        };
        let node_count = self.nodes.node_count();
        let agents = self.agents.lock().unwrap();
        let Some(agents) = agents.as_ref() else {
            return Err(latticed_base::err(latticed_base::ErrorKind::Shutdown, "controller is shutting down"));
        };
        for placement in &placements {
            let credential = to_wire_credential(&placement.signed_credential);
            let cpu_bitmap = node_selection_bitmap(&placement.selected_nodes, node_count);
            let batch_host_name = self.nodes.with_node(placement.batch_host, |n| n.name.clone())?;
            let body = RpcBody::BatchJobLaunch {
                job_id: JobId::simple(placement.job_id),
                node_list: placement.node_list.clone(),
                cpu_bitmap,
                credential,
                script: Vec::new(),
                environment: Vec::new(),
            };
            agents.submit(Task::new(placement.job_id, batch_host_name, body));
        }
        Ok(placements.len())
    }

    fn dispatch_rpc(&self, envelope: &Envelope, now_ms: u64) -> Result<()> {
        let body = envelope.decode_body()?;
        match body {
            RpcBody::Ping => Ok(()),
            RpcBody::KillJob { job_id, hurry } => self.cancel_job(job_id.base, hurry, now_ms),
            RpcBody::TerminateTasks { job_id, .. } => self.terminate_batch_step(job_id.base, now_ms),
            RpcBody::SignalTasks { job_id, signal, .. } => self.signal_job(job_id.base, signal, now_ms),
            RpcBody::KillTimelimit { job_id } => self.time_limit_breach(job_id.base, now_ms),
            RpcBody::NodeRegistrationStatus { node_name, .. } => {
                let idx = self
                    .nodes
                    .lookup_by_name(&node_name)
                    .ok_or_else(|| not_found(format!("node {node_name} unknown")))?;
                self.nodes.record_response(idx, now_ms)
            }
            RpcBody::JobNotify { job_id, message } => {
                info!(job_id = job_id.base, message = %message, "job notify received");
                Ok(())
            }
            RpcBody::Reconfigure => {
                info!("reconfigure requested; this controller picks up config changes only on restart");
                Ok(())
            }
            RpcBody::Shutdown => self.begin_shutdown(),
            RpcBody::BatchJobLaunch { .. } | RpcBody::LaunchTasks { .. } | RpcBody::SlurmRc { .. } => {
                Err(invalid_input("this rpc flows controller -> node, not inbound to the controller"))
            }
        }
    }

    pub fn handle_rpc(&self, envelope: &Envelope, now_ms: u64) -> Envelope {
        let body = match self.dispatch_rpc(envelope, now_ms) {
            Ok(()) => RpcBody::SlurmRc { code: 0, message: String::new() },
            Err(err) => RpcBody::SlurmRc { code: err.kind().wire_code(), message: err.to_string() },
        };
        Envelope::encode(&body, Vec::new()).expect("encoding a SlurmRc reply cannot fail")
    }

    fn save_snapshot(&self) -> Result<()> {
        let now_s = now_unix_s();
        {
            let _guard = LockGuard::acquire(LockRank::Jobs);
            let sched = self.jobs.read().unwrap();
            let jobs: Vec<_> = sched.all_jobs().cloned().collect();
            snapshot::save_job_state(&self.state_dir, now_s, &jobs)?;
        }
        {
            let _guard = LockGuard::acquire(LockRank::Nodes);
            snapshot::save_node_state(&self.state_dir, now_s, &self.nodes.node_states())?;
            snapshot::save_part_state(&self.state_dir, now_s, &self.nodes.partition_snapshot())?;
        }
        {
            let assoc = self.assoc.lock().unwrap();
            let records: Vec<_> = assoc.all().cloned().collect();
            snapshot::save_assoc_mgr_state(&self.state_dir, now_s, &records)?;
        }
        snapshot::save_priority_last_decay_ran(&self.state_dir, now_s)?;
        Ok(())
    }

    pub fn begin_shutdown(&self) -> Result<()> {
        *self.phase.lock().unwrap() = ControllerPhase::Draining;
        self.save_snapshot()?;
        *self.phase.lock().unwrap() = ControllerPhase::Stopped;
        if let Some(pool) = self.agents.lock().unwrap().take() {
            pool.shutdown();
        }
        Ok(())
    }

    pub fn config_snapshot(&self) -> Config {
        self.config.read().unwrap().clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{AssociationSeed, NodeConfig, PartitionConfig};
    use test_log::test;

    fn test_config(state_dir: &str) -> Config {
        Config {
            cluster_name: "smoke".to_string(),
            cluster_id: 1,
            state_dir: state_dir.to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            agent_thread_count: 2,
            wdog_poll_secs: 2,
            command_timeout_secs: 2,
            requeue_on_node_fail: false,
            nodes: vec![NodeConfig {
                hosts: "node01".to_string(),
                port: 65535,
                weight: 1,
                boards: 1,
                sockets: 1,
                cores: 4,
                threads: 1,
                real_memory_mb: 8192,
                tmp_disk_mb: 0,
                features: Vec::new(),
                gres: String::new(),
            }],
            partitions: vec![PartitionConfig {
                name: "batch".to_string(),
                nodes: "node01".to_string(),
                is_default: true,
                max_job_nodes: None,
                max_time_minutes: None,
            }],
            associations: vec![AssociationSeed {
                account: "acct".to_string(),
                user: Some("alice".to_string()),
                is_default: true,
                max_cpus: None,
                max_jobs: None,
            }],
            signing_key_seed_hex: Some("00".repeat(32)),
        }
    }

    fn unique_state_dir(tag: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("latticed-ctld-controller-test-{tag}-{}-{unique}", std::process::id()))
    }

    #[test]
    fn fresh_controller_starts_in_the_starting_phase() {
        let dir = unique_state_dir("phase");
        let controller = Controller::new(test_config(dir.to_str().unwrap())).unwrap();
        assert_eq!(controller.phase(), ControllerPhase::Starting);
        controller.mark_running();
        assert_eq!(controller.phase(), ControllerPhase::Running);
    }

    #[test]
    fn submit_then_schedule_places_the_job_on_the_idle_node() {
        let dir = unique_state_dir("submit-schedule");
        let controller = Controller::new(test_config(dir.to_str().unwrap())).unwrap();
        let assoc_id = {
            let assoc = controller.assoc.lock().unwrap();
            assoc.lookup("smoke", "acct", Some("alice"), None).unwrap()
        };
        let req = SubmitRequest {
            user: "alice".to_string(),
            assoc: assoc_id,
            partition: "batch".to_string(),
            requested_cpus: 4,
            contiguous: true,
            features: Vec::new(),
            node_list: None,
            exclude_list: None,
            time_limit_minutes: None,
        };
        let job_id = controller.submit_job(req, 1_700_000_000_000).unwrap();
        assert!(job_id > 0);

        let placed = controller.schedule_tick(1_700_000_000_500).unwrap();
        assert_eq!(placed, 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cancelling_an_unknown_job_is_an_error() {
        let dir = unique_state_dir("cancel-unknown");
        let controller = Controller::new(test_config(dir.to_str().unwrap())).unwrap();
        assert!(controller.cancel_job(999, false, 0).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn ping_rpc_gets_a_success_reply() {
        let dir = unique_state_dir("ping");
        let controller = Controller::new(test_config(dir.to_str().unwrap())).unwrap();
        let envelope = Envelope::encode(&RpcBody::Ping, Vec::new()).unwrap();
        let reply = controller.handle_rpc(&envelope, 0);
        match reply.decode_body().unwrap() {
            RpcBody::SlurmRc { code, .. } => assert_eq!(code, 0),
            other => panic!("unexpected reply {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn node_directed_rpc_inbound_is_rejected() {
        let dir = unique_state_dir("reject-node-directed");
        let controller = Controller::new(test_config(dir.to_str().unwrap())).unwrap();
        let envelope = Envelope::encode(&RpcBody::SlurmRc { code: 0, message: String::new() }, Vec::new()).unwrap();
        let reply = controller.handle_rpc(&envelope, 0);
        match reply.decode_body().unwrap() {
            RpcBody::SlurmRc { code, .. } => assert_ne!(code, 0),
            other => panic!("unexpected reply {other:?}"),
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn shutdown_writes_a_snapshot_and_stops_the_pool() {
        let dir = unique_state_dir("shutdown");
        let controller = Controller::new(test_config(dir.to_str().unwrap())).unwrap();
        controller.begin_shutdown().unwrap();
        assert_eq!(controller.phase(), ControllerPhase::Stopped);
        assert!(snapshot::load_node_state(&dir).unwrap().is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
