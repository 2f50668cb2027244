//! Submission, scheduling, and every other state transition the job
//! table supports. New — no teacher precedent for node-bitmap
//! placement or backfill bin-packing — but it reads `latticed-nodes`
//! and `latticed-assoc` the same way `submerge-txn`'s `Transaction`
//! reads its `submerge_net`/`submerge_lang` collaborators.

use crate::job::{Job, JobState, SubmitRequest};
use latticed_assoc::AssocTree;
use latticed_base::{constraint_violation, invalid_input, not_found, Bitmap, Result, SluidGen};
use latticed_cred::{Credential, CredentialSigner, SignedCredential, StepId};
use latticed_nodes::{NodeIdx, ResourceTable};
use std::collections::HashMap;

/// Kill-class signals drive a job straight toward completion rather
/// than just toggling the `SIGNALING` flag.
const KILL_SIGNALS: [i32; 2] = [9, 15];

#[derive(Clone, Debug)]
pub struct Placement {
    pub job_id: u64,
    pub selected_nodes: Vec<NodeIdx>,
    pub batch_host: NodeIdx,
    pub node_list: String,
    pub signed_credential: SignedCredential,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LaunchReplyOutcome {
    Success,
    PrologFailed,
    EpilogFailed,
    InvalidJobId,
    NoResponse,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LaunchReplyAction {
    NoAction,
    MarkNodeDown,
    Requeued,
    NodeAlreadyDone,
}

/// A single future node-time reservation used by the backfill variant,
/// a set of `(start_time, duration, node_bitmap)` triples kept sorted
/// by `start_time`.
#[derive(Clone, Debug)]
pub struct Reservation {
    pub start_unix_ms: u64,
    pub duration_ms: u64,
    pub node_bitmap: Bitmap,
}

#[derive(Default)]
pub struct ReservationMap {
    entries: Vec<Reservation>,
}

impl ReservationMap {
    pub fn new() -> ReservationMap {
        ReservationMap::default()
    }

    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .entries
            .partition_point(|r| r.start_unix_ms <= reservation.start_unix_ms);
        self.entries.insert(pos, reservation);
    }

    pub fn entries(&self) -> &[Reservation] {
        &self.entries
    }

    /// `true` if `candidate` overlaps no reservation whose window
    /// intersects `[start, start + duration)`.
    pub fn is_free(&self, candidate: &Bitmap, start_unix_ms: u64, duration_ms: u64) -> bool {
        let end = start_unix_ms + duration_ms;
        self.entries.iter().all(|r| {
            let r_end = r.start_unix_ms + r.duration_ms;
            let overlaps_time = start_unix_ms < r_end && r.start_unix_ms < end;
            !overlaps_time || r.node_bitmap.overlap_count(candidate) == 0
        })
    }
}

pub struct Scheduler {
    jobs: HashMap<u64, Job>,
    sluid: SluidGen,
    signer: CredentialSigner,
    pub reservations: ReservationMap,
}

impl Scheduler {
    pub fn new(cluster_id: u16, signer: CredentialSigner) -> Scheduler {
        Scheduler {
            jobs: HashMap::new(),
            sluid: SluidGen::new(cluster_id, 0),
            signer,
            reservations: ReservationMap::new(),
        }
    }

    /// Rebuilds a scheduler from a snapshot's job rows. `minimum_unix_ms`
    /// should be at least the latest `unix_ms_of` across `jobs` so newly
    /// generated ids stay strictly greater than every restored one.
    pub fn restore(cluster_id: u16, signer: CredentialSigner, minimum_unix_ms: u64, jobs: Vec<Job>) -> Scheduler {
        Scheduler {
            jobs: jobs.into_iter().map(|j| (j.id, j)).collect(),
            sluid: SluidGen::new(cluster_id, minimum_unix_ms),
            signer,
            reservations: ReservationMap::new(),
        }
    }

    pub fn get(&self, job_id: u64) -> Option<&Job> {
        self.jobs.get(&job_id)
    }

    pub fn all_jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    fn get_mut(&mut self, job_id: u64) -> Result<&mut Job> {
        self.jobs.get_mut(&job_id).ok_or_else(|| not_found(format!("job {job_id} unknown")))
    }

    /// `submit` — validates the association and partition, then adds
    /// a new job in PENDING.
    pub fn submit(
        &mut self,
        table: &ResourceTable,
        assoc_tree: &AssocTree,
        req: SubmitRequest,
        now_ms: u64,
    ) -> Result<u64> {
        let assoc = assoc_tree
            .get(req.assoc)
            .ok_or_else(|| not_found("association unknown"))?;
        if assoc.deleted {
            return Err(invalid_input("association is deleted"));
        }
        table.partition_nodes(&req.partition)?;
        if let Some(max_cpus) = assoc_tree.effective_limit(req.assoc, |l| l.max_cpus) {
            if req.requested_cpus as u64 > max_cpus {
                return Err(constraint_violation("requested CPUs exceed association limit"));
            }
        }
        let id = self.sluid.generate(now_ms);
        let job = Job::new(id, now_ms, req);
        self.jobs.insert(id, job);
        Ok(id)
    }

    fn idle_node_bitmap(&self, table: &ResourceTable, job: &Job) -> Result<Bitmap> {
        let node_count = table.node_count();
        let mut bitmap = Bitmap::alloc(node_count);
        for i in 0..node_count {
            let idx = NodeIdx(i as u32);
            let idle = table.with_node(idx, |n| {
                n.state.base == latticed_nodes::BaseState::Idle
                    && !n.state.flags.draining
                    && !n.state.flags.no_respond
            })?;
            if idle {
                bitmap.set(i);
            }
        }
        if !job.features.is_empty() {
            let feature_bitmap = table.nodes_with_features(&job.features)?;
            bitmap.and(&feature_bitmap);
        }
        Ok(bitmap)
    }

    /// Attempts to place every PENDING job, priority-ordered
    /// (highest `priority` first, lower job id breaking ties),
    /// building a signed launch credential for each job it can place.
    /// Jobs that don't fit stay PENDING for the next pass.
    pub fn schedule_once(&mut self, table: &ResourceTable) -> Result<Vec<Placement>> {
        let mut pending_ids: Vec<u64> = self
            .jobs
            .values()
            .filter(|j| j.state == JobState::Pending)
            .map(|j| j.id)
            .collect();
        pending_ids.sort_by(|a, b| {
            let ja = &self.jobs[a];
            let jb = &self.jobs[b];
            jb.priority
                .partial_cmp(&ja.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.cmp(b))
        });

        let mut placements = Vec::new();
        for id in pending_ids {
            if let Some(placement) = self.try_place(table, id)? {
                placements.push(placement);
            }
        }
        Ok(placements)
    }

    /// Every start position of a contiguous run of `len` idle bits.
    fn contiguous_runs(idle: &Bitmap, len: usize) -> Vec<usize> {
        let size = idle.size();
        if len == 0 || len > size {
            return Vec::new();
        }
        (0..=size - len).filter(|&start| idle.set_count_range(start, start + len) == len).collect()
    }

    /// Sum of `weight` over `[start, start + len)`, the packing sort
    /// key a run of nodes is compared by.
    fn run_weight(table: &ResourceTable, start: usize, len: usize) -> Result<u64> {
        let mut total = 0u64;
        for i in start..start + len {
            total += table.with_node(NodeIdx(i as u32), |n| n.weight)? as u64;
        }
        Ok(total)
    }

    fn try_place(&mut self, table: &ResourceTable, job_id: u64) -> Result<Option<Placement>> {
        let job = self.jobs.get(&job_id).expect("job just listed as pending");
        let idle = self.idle_node_bitmap(table, job)?;
        if idle.popcount() == 0 {
            return Ok(None);
        }
        let per_node_cpus = {
            let first = idle.first_set().expect("popcount > 0 implies a set bit");
            table.with_node(NodeIdx(first as u32), |n| n.cpus())?
        };
        if per_node_cpus == 0 {
            return Ok(None);
        }
        let nodes_needed = job.requested_cpus.div_ceil(per_node_cpus) as usize;
        if nodes_needed == 0 || nodes_needed > idle.size() {
            return Ok(None);
        }

        // Lower weight packs first; equal weight breaks by lower node
        // index, matching the cluster-wide tie-break rule.
        let selected = if job.contiguous {
            let runs = Self::contiguous_runs(&idle, nodes_needed);
            if runs.is_empty() {
                return Ok(None);
            }
            let mut best: Option<(u64, usize)> = None;
            for start in runs {
                let weight = Self::run_weight(table, start, nodes_needed)?;
                let better = match best {
                    Some((bw, bs)) => (weight, start) < (bw, bs),
                    None => true,
                };
                if better {
                    best = Some((weight, start));
                }
            }
            let start = best.expect("runs is non-empty").1;
            let mut bitmap = Bitmap::alloc(idle.size());
            for i in start..start + nodes_needed {
                bitmap.set(i);
            }
            bitmap
        } else {
            if idle.popcount() < nodes_needed {
                return Ok(None);
            }
            let mut candidates: Vec<(u64, usize)> = Vec::new();
            for i in 0..idle.size() {
                if idle.test(i) {
                    let weight = table.with_node(NodeIdx(i as u32), |n| n.weight)? as u64;
                    candidates.push((weight, i));
                }
            }
            candidates.sort_unstable();
            let mut bitmap = Bitmap::alloc(idle.size());
            for (_, i) in candidates.into_iter().take(nodes_needed) {
                bitmap.set(i);
            }
            bitmap
        };

        let selected_nodes: Vec<NodeIdx> =
            (0..selected.size()).filter(|&i| selected.test(i)).map(|i| NodeIdx(i as u32)).collect();
        let batch_host = selected_nodes[0];

        for &idx in &selected_nodes {
            table.with_node_mut(idx, |n| n.state.base = latticed_nodes::BaseState::Allocated)?;
        }

        let names: Result<Vec<String>> = selected_nodes
            .iter()
            .map(|&idx| table.with_node(idx, |n| n.name.clone()))
            .collect();
        let node_list = latticed_base::hostlist_compress(&names?);

        let job = self.get_mut(job_id)?;
        job.set_node_bitmap(&selected);
        job.batch_host = Some(batch_host);
        job.state = JobState::Running;

        let expiration_unix_ms = job.submit_unix_ms + job.time_limit_minutes.unwrap_or(60) * 60_000;
        let credential = Credential {
            job_id,
            step_id: StepId::BatchScript,
            uid: 0,
            gid: 0,
            node_list: node_list.clone(),
            core_bitmaps_per_node: selected_nodes
                .iter()
                .map(|_| Bitmap::alloc(per_node_cpus as usize).pack())
                .collect(),
            memory_per_node: vec![0; selected_nodes.len()],
            expiration_unix_ms,
        };
        let signed_credential = self.signer.sign(credential)?;

        Ok(Some(Placement {
            job_id,
            selected_nodes,
            batch_host,
            node_list,
            signed_credential,
        }))
    }

    pub fn signal(&mut self, job_id: u64, signal: i32) -> Result<()> {
        let job = self.get_mut(job_id)?;
        if job.state.is_terminal() {
            return Err(latticed_base::err(
                latticed_base::ErrorKind::AlreadyDone,
                "job already in a terminal state",
            ));
        }
        if KILL_SIGNALS.contains(&signal) {
            job.state = JobState::Completing;
        } else if job.state == JobState::Running {
            job.flags.signaling = true;
        }
        Ok(())
    }

    pub fn ack_signal(&mut self, job_id: u64) -> Result<()> {
        let job = self.get_mut(job_id)?;
        job.flags.signaling = false;
        Ok(())
    }

    pub fn suspend(&mut self, job_id: u64, now_ms: u64) -> Result<()> {
        let job = self.get_mut(job_id)?;
        if job.state != JobState::Running {
            return Err(invalid_input("can only suspend a RUNNING job"));
        }
        job.state = JobState::Suspended;
        job.suspended_at_ms = Some(now_ms);
        Ok(())
    }

    pub fn resume(&mut self, job_id: u64, now_ms: u64) -> Result<()> {
        let job = self.get_mut(job_id)?;
        if job.state != JobState::Suspended {
            return Err(invalid_input("can only resume a SUSPENDED job"));
        }
        job.state = JobState::Running;
        if let Some(since) = job.suspended_at_ms.take() {
            job.suspended_accum_ms += now_ms.saturating_sub(since);
        }
        Ok(())
    }

    /// time-limit breach: RUNNING -> TIMEOUT (final). Returns the
    /// allocated nodes the caller must fan out KILL_TIMELIMIT to.
    pub fn time_limit_breach(&mut self, job_id: u64, now_ms: u64) -> Result<Vec<NodeIdx>> {
        let job = self.get_mut(job_id)?;
        if job.state.is_terminal() {
            return Err(latticed_base::err(
                latticed_base::ErrorKind::AlreadyDone,
                "job already in a terminal state",
            ));
        }
        let nodes = job.allocated_nodes();
        job.state = JobState::Timeout;
        job.end_unix_ms = Some(now_ms);
        Ok(nodes)
    }

    /// node-fail: RUNNING -> NODE_FAIL (final), or -> PENDING with
    /// REQUEUE set if requeue is configured and the job's allocation
    /// is released for a fresh placement attempt.
    pub fn node_fail(&mut self, job_id: u64, requeue_configured: bool, now_ms: u64) -> Result<()> {
        let job = self.get_mut(job_id)?;
        if job.state.is_terminal() {
            return Err(latticed_base::err(
                latticed_base::ErrorKind::AlreadyDone,
                "job already in a terminal state",
            ));
        }
        if requeue_configured {
            job.state = JobState::Pending;
            job.flags.requeue = true;
            job.set_node_bitmap(&Bitmap::alloc(0));
            job.batch_host = None;
        } else {
            job.state = JobState::NodeFail;
            job.end_unix_ms = Some(now_ms);
        }
        Ok(())
    }

    /// Per-node launch/step reply handling (§4.D failure semantics).
    pub fn handle_launch_reply(
        &mut self,
        job_id: u64,
        failed_node: Option<NodeIdx>,
        outcome: LaunchReplyOutcome,
        requeue_configured: bool,
        now_ms: u64,
    ) -> Result<LaunchReplyAction> {
        match outcome {
            LaunchReplyOutcome::Success | LaunchReplyOutcome::NoResponse => Ok(LaunchReplyAction::NoAction),
            LaunchReplyOutcome::InvalidJobId => Ok(LaunchReplyAction::NodeAlreadyDone),
            LaunchReplyOutcome::PrologFailed | LaunchReplyOutcome::EpilogFailed => {
                let _ = failed_node;
                if requeue_configured {
                    self.node_fail(job_id, true, now_ms)?;
                    Ok(LaunchReplyAction::Requeued)
                } else {
                    let job = self.get_mut(job_id)?;
                    job.state = JobState::Failed;
                    job.end_unix_ms = Some(now_ms);
                    Ok(LaunchReplyAction::MarkNodeDown)
                }
            }
        }
    }

    /// A job is COMPLETED once it has left RUNNING (via signal/kill,
    /// now in COMPLETING) and every step and the epilog have finished.
    pub fn maybe_complete(&mut self, job_id: u64, all_steps_done: bool, epilog_complete: bool, now_ms: u64) -> Result<bool> {
        let job = self.get_mut(job_id)?;
        if job.state == JobState::Completing && all_steps_done && epilog_complete {
            job.state = JobState::Completed;
            job.end_unix_ms = Some(now_ms);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn cancel(&mut self, job_id: u64, now_ms: u64) -> Result<()> {
        let job = self.get_mut(job_id)?;
        if job.state.is_terminal() {
            return Err(latticed_base::err(
                latticed_base::ErrorKind::AlreadyDone,
                "job already in a terminal state",
            ));
        }
        if job.state == JobState::Pending {
            job.state = JobState::Cancelled;
            job.end_unix_ms = Some(now_ms);
        } else {
            job.state = JobState::Completing;
            job.flags.revoked = true;
        }
        Ok(())
    }

    pub fn set_priority(&mut self, job_id: u64, priority: f64) -> Result<()> {
        self.get_mut(job_id)?.priority = priority;
        Ok(())
    }
}
