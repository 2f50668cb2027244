use std::collections::HashMap;

/// Tracks per-node outstanding RPC deadlines so a background sweep can
/// notice a node stuck past its `COMMAND_TIMEOUT` without blocking on
/// an individual socket read. Generalizes `submerge-net`'s
/// `Node::requests: BTreeMap<i64, Request>` pending-request bookkeeping
/// from "indexed by message sequence" to "indexed by node name", since
/// the unit of retry here is node responsiveness, not message identity.
#[derive(Default)]
pub struct Watchdog {
    deadlines: HashMap<String, u64>,
}

impl Watchdog {
    pub fn new() -> Watchdog {
        Watchdog::default()
    }

    pub fn arm(&mut self, node: &str, deadline_ms: u64) {
        self.deadlines.insert(node.to_string(), deadline_ms);
    }

    pub fn disarm(&mut self, node: &str) {
        self.deadlines.remove(node);
    }

    /// Nodes whose deadline has passed as of `now_ms`, per the
    /// `WDOG_POLL` sweep; each is removed once reported.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .deadlines
            .iter()
            .filter(|(_, &deadline)| deadline <= now_ms)
            .map(|(node, _)| node.clone())
            .collect();
        for node in &expired {
            self.deadlines.remove(node);
        }
        expired
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn armed_node_expires_after_its_deadline() {
        let mut w = Watchdog::new();
        w.arm("n0", 1_000);
        assert!(w.sweep(999).is_empty());
        assert_eq!(w.sweep(1_000), vec!["n0".to_string()]);
        assert!(w.sweep(2_000).is_empty());
    }

    #[test]
    fn disarm_cancels_the_deadline() {
        let mut w = Watchdog::new();
        w.arm("n0", 1_000);
        w.disarm("n0");
        assert!(w.sweep(1_000).is_empty());
    }
}
