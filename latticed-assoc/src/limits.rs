use serde::{Deserialize, Serialize};

/// Every field is `None` unless this association sets its own
/// override; effective values are resolved by walking toward the root
/// and taking the first `Some`, via [`crate::tree::AssocTree::effective_limit`].
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub max_jobs: Option<u32>,
    pub max_submit_jobs: Option<u32>,
    pub max_cpus: Option<u64>,
    pub max_nodes: Option<u32>,
    pub max_wall_minutes: Option<u64>,
}
