//! The job record and its state machine. Keeps the shape of
//! `submerge-txn`'s `Transaction { time, thunk, state }` (a record
//! carrying a small terminal-or-not `State` enum) but replaces the
//! five OceanVista replication states with the full job lifecycle.

use latticed_assoc::AssocId;
use latticed_base::Bitmap;
use latticed_nodes::NodeIdx;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Suspended,
    Completing,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    NodeFail,
    Preempted,
    OutOfMemory,
    BootFail,
    Deadline,
}

impl JobState {
    /// Terminal states are absorbing: no transition leads out of them.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed
                | JobState::Cancelled
                | JobState::Failed
                | JobState::Timeout
                | JobState::NodeFail
                | JobState::Preempted
                | JobState::OutOfMemory
                | JobState::BootFail
                | JobState::Deadline
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct JobFlags {
    pub signaling: bool,
    pub requeue: bool,
    pub requeue_hold: bool,
    pub special_exit: bool,
    pub resizing: bool,
    pub configuring: bool,
    pub power_up_node: bool,
    pub revoked: bool,
    pub update_db: bool,
    pub stage_out: bool,
    pub resv_del_hold: bool,
}

#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub user: String,
    pub assoc: AssocId,
    pub partition: String,
    pub requested_cpus: u32,
    pub contiguous: bool,
    pub features: Vec<String>,
    pub node_list: Option<String>,
    pub exclude_list: Option<String>,
    pub time_limit_minutes: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub user: String,
    pub assoc: AssocId,
    pub partition: String,
    pub state: JobState,
    pub flags: JobFlags,
    pub requested_cpus: u32,
    pub contiguous: bool,
    pub features: Vec<String>,
    pub node_list: Option<String>,
    pub exclude_list: Option<String>,
    pub time_limit_minutes: Option<u64>,
    pub submit_unix_ms: u64,
    pub start_unix_ms: Option<u64>,
    pub end_unix_ms: Option<u64>,
    pub suspended_accum_ms: u64,
    pub suspended_at_ms: Option<u64>,
    /// Packed `(bit_count, word_count, words)`, the same wire shape
    /// `latticed_wire::PackedBitmap` uses — kept packed here too so a
    /// `Job` round-trips through persistence without this crate
    /// depending on `latticed-wire`.
    node_bitmap_packed: Option<(u64, u64, Vec<u64>)>,
    pub batch_host: Option<NodeIdx>,
    pub priority: f64,
}

impl Job {
    pub fn new(id: u64, submit_unix_ms: u64, req: SubmitRequest) -> Job {
        Job {
            id,
            user: req.user,
            assoc: req.assoc,
            partition: req.partition,
            state: JobState::Pending,
            flags: JobFlags::default(),
            requested_cpus: req.requested_cpus,
            contiguous: req.contiguous,
            features: req.features,
            node_list: req.node_list,
            exclude_list: req.exclude_list,
            time_limit_minutes: req.time_limit_minutes,
            submit_unix_ms,
            start_unix_ms: None,
            end_unix_ms: None,
            suspended_accum_ms: 0,
            suspended_at_ms: None,
            node_bitmap_packed: None,
            batch_host: None,
            priority: 0.0,
        }
    }

    pub fn node_bitmap(&self) -> latticed_base::Result<Option<Bitmap>> {
        match &self.node_bitmap_packed {
            None => Ok(None),
            Some((bits, words, data)) => Ok(Some(Bitmap::unpack(*bits, *words, data.clone())?)),
        }
    }

    pub fn set_node_bitmap(&mut self, bitmap: &Bitmap) {
        self.node_bitmap_packed = Some(bitmap.pack());
    }

    pub fn allocated_nodes(&self) -> Vec<NodeIdx> {
        let Ok(Some(bitmap)) = self.node_bitmap() else { return Vec::new() };
        (0..bitmap.size()).filter(|&i| bitmap.test(i)).map(|i| NodeIdx(i as u32)).collect()
    }
}
