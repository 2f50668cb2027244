//! Node and config records. Config records are interned: every node
//! sharing the same CPU/memory/feature line points at one shared
//! `Arc<ConfigRecord>`, the way `submerge-coldb`'s `dict.rs` interns
//! repeated strings once rather than storing them per-row.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stable index into the resource table's node vector. Never reused
/// across a node's lifetime — indices are an arena key, not a pointer,
/// so a stale `NodeIdx` from before a node was ever added simply
/// doesn't resolve, rather than dangling.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct NodeIdx(pub u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BaseState {
    Unknown,
    Idle,
    Allocated,
    Down,
    Drain,
    Fail,
}

/// `OR`-able state flags layered on top of `BaseState` — a node can be
/// `Allocated` and also `draining` (finish running jobs, accept no
/// new ones).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeFlags {
    pub cloud: bool,
    pub power_save: bool,
    pub no_respond: bool,
    pub draining: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub base: BaseState,
    pub flags: NodeFlags,
}

impl NodeState {
    pub fn idle() -> NodeState {
        NodeState { base: BaseState::Idle, flags: NodeFlags::default() }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self.base, BaseState::Idle | BaseState::Allocated)
            && !self.flags.draining
            && !self.flags.no_respond
    }
}

/// Shared among every node declaring an identical CPU/memory/feature
/// line.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConfigRecord {
    pub boards: u32,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
    pub real_memory_mb: u64,
    pub tmp_disk_mb: u64,
    pub feature_set: Vec<String>,
    pub gres: String,
}

impl ConfigRecord {
    pub fn cpus(&self) -> u32 {
        self.boards * self.sockets * self.cores * self.threads
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub comm_address: String,
    pub hostname: String,
    pub port: u16,
    pub weight: u32,
    pub state: NodeState,
    pub last_response_unix_ms: u64,
    pub reason: Option<String>,
    pub config: Arc<ConfigRecord>,
    /// Cores reserved outside this controller's control (e.g. pinned
    /// by the host OS), addressed the same way allocatable cores are.
    pub reserved_cores: latticed_base::Bitmap,
}

impl NodeRecord {
    pub fn cpus(&self) -> u32 {
        self.config.cpus()
    }
}
