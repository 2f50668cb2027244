//! Property-based checks for lineage consistency (§8 item 6) across
//! randomized add sequences, using `proptest` the way
//! `hlieu5402-collab-spark2026` exercises its own tree structures.

use crate::{AccountingStore, AssocTree, InMemoryAccountingStore, NewAssociation};
use proptest::prelude::*;
use std::sync::Arc;

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z]{2,6}"
}

proptest! {
    #[test]
    fn lineage_always_extends_parent_lineage(names in proptest::collection::vec(arb_name(), 1..8)) {
        let store = Arc::new(InMemoryAccountingStore::new()) as Arc<dyn AccountingStore>;
        let mut tree = AssocTree::new("cluster1", store);
        let root = tree.root();
        let mut parents = vec![root];
        for (i, name) in names.into_iter().enumerate() {
            let parent = parents[i % parents.len()];
            if let Ok(id) = tree.add(parent, NewAssociation::account("cluster1", name), i as u64, "prop") {
                let rec = tree.get(id).unwrap();
                let parent_rec = tree.get(parent).unwrap();
                prop_assert!(rec.lineage.starts_with(&parent_rec.lineage));
                parents.push(id);
            }
        }
    }

    #[test]
    fn move_parent_preserves_descendant_count(
        names in proptest::collection::vec(arb_name(), 3..8),
    ) {
        let store = Arc::new(InMemoryAccountingStore::new()) as Arc<dyn AccountingStore>;
        let mut tree = AssocTree::new("cluster1", store);
        let root = tree.root();
        let mut ids = vec![root];
        for (i, name) in names.iter().enumerate() {
            let parent = ids[i % ids.len()];
            if let Ok(id) = tree.add(parent, NewAssociation::account("cluster1", name.clone()), i as u64, "prop") {
                ids.push(id);
            }
        }
        if ids.len() < 3 {
            return Ok(());
        }
        let moving = ids[ids.len() - 1];
        let target = ids[1];
        let before = ids.len();
        if tree.move_parent(moving, target, 99, "prop").is_ok() {
            prop_assert_eq!(ids.len(), before);
        }
    }
}
