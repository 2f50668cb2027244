use crate::node::NodeIdx;
use serde::{Deserialize, Serialize};

/// A partition is an ordered, named subset of the node table plus the
/// limits that apply to jobs submitted against it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub nodes: Vec<NodeIdx>,
    pub max_job_nodes: Option<u32>,
    pub max_time_minutes: Option<u64>,
    pub allow_groups: Option<Vec<String>>,
    pub deny_groups: Option<Vec<String>>,
    pub is_default: bool,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Partition {
        Partition {
            name: name.into(),
            nodes: Vec::new(),
            max_job_nodes: None,
            max_time_minutes: None,
            allow_groups: None,
            deny_groups: None,
            is_default: false,
        }
    }

    pub fn group_permits(&self, group: &str) -> bool {
        if let Some(deny) = &self.deny_groups {
            if deny.iter().any(|g| g == group) {
                return false;
            }
        }
        match &self.allow_groups {
            Some(allow) => allow.iter().any(|g| g == group),
            None => true,
        }
    }
}
