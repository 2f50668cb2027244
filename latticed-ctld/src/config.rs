//! The controller's startup configuration, read once from a TOML file
//! at `latticed-ctld`'s own path (no cluster-wide config distribution
//! protocol in this workspace — that's out of scope). Field names
//! follow the node/partition/association records they seed in
//! `latticed-nodes`/`latticed-assoc` rather than any on-disk file
//! grammar of the original cluster manager.

use serde::Deserialize;
use std::path::Path;

fn default_agent_thread_count() -> usize {
    latticed_agent::DEFAULT_THREAD_COUNT
}

fn default_wdog_poll_secs() -> u64 {
    latticed_agent::WDOG_POLL.as_secs()
}

fn default_command_timeout_secs() -> u64 {
    latticed_agent::COMMAND_TIMEOUT.as_secs()
}

fn default_weight() -> u32 {
    1
}

fn default_tmp_disk_mb() -> u64 {
    0
}

#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// A hostlist pattern (`latticed_base::hostlist_expand` grammar),
    /// not a single hostname — one config line seeds a whole range.
    pub hosts: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub boards: u32,
    pub sockets: u32,
    pub cores: u32,
    pub threads: u32,
    pub real_memory_mb: u64,
    #[serde(default = "default_tmp_disk_mb")]
    pub tmp_disk_mb: u64,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub gres: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PartitionConfig {
    pub name: String,
    /// A hostlist pattern; every host it expands to must already have
    /// been declared by a `[[nodes]]` entry.
    pub nodes: String,
    #[serde(default)]
    pub is_default: bool,
    pub max_job_nodes: Option<u32>,
    pub max_time_minutes: Option<u64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AssociationSeed {
    pub account: String,
    pub user: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub max_cpus: Option<u64>,
    pub max_jobs: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub cluster_name: String,
    pub cluster_id: u16,
    pub state_dir: String,
    pub bind_address: String,
    #[serde(default = "default_agent_thread_count")]
    pub agent_thread_count: usize,
    #[serde(default = "default_wdog_poll_secs")]
    pub wdog_poll_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub requeue_on_node_fail: bool,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub partitions: Vec<PartitionConfig>,
    #[serde(default)]
    pub associations: Vec<AssociationSeed>,
    /// Hex-encoded 32-byte ed25519 seed for the credential signer. A
    /// missing seed means a fresh random key is generated at startup,
    /// fine for a smoke-test cluster but useless across restarts since
    /// node daemons cache the verifying key they first saw.
    pub signing_key_seed_hex: Option<String>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> latticed_base::Result<Config> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let text = r#"
            cluster_name = "smoke"
            cluster_id = 1
            state_dir = "/var/lib/latticed"
            bind_address = "127.0.0.1:7002"

            [[nodes]]
            hosts = "node[01-04]"
            port = 7003
            boards = 1
            sockets = 2
            cores = 8
            threads = 1
            real_memory_mb = 65536

            [[partitions]]
            name = "batch"
            nodes = "node[01-04]"
            is_default = true
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.agent_thread_count, latticed_agent::DEFAULT_THREAD_COUNT);
        assert_eq!(config.nodes.len(), 1);
        assert_eq!(config.nodes[0].weight, 1);
        assert!(config.partitions[0].is_default);
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let text = r#"
            cluster_name = "smoke"
            cluster_id = 1
        "#;
        assert!(toml::from_str::<Config>(text).is_err());
    }
}
