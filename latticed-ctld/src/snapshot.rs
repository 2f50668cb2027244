//! On-disk state persistence: one file per entity family under the
//! configured state directory, written on a clean shutdown and read
//! back on the next startup. Each file is `8-byte format tag + 2-byte
//! protocol version + 8-byte (i64, big-endian) unix-seconds timestamp
//! + rmp_serde-packed records`.
//!
//! A version mismatch on read is not fatal: this controller always
//! tries to decode the body anyway and only warns on failure, since a
//! snapshot written by an older minor version of this same record
//! shape almost always still decodes fine under `rmp_serde`'s
//! self-describing encoding. Nothing here models `fed_mgr_state` or
//! `resv_state` — no federation manager or reservation type exists in
//! this workspace to snapshot.

use latticed_base::{invalid_input, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

const PROTOCOL_VERSION: u16 = 1;
const HEADER_LEN: usize = 8 + 2 + 8;

fn family_path(dir: &Path, family: &str) -> PathBuf {
    dir.join(format!("{family}.snapshot"))
}

fn write_family<T: Serialize>(dir: &Path, family: &str, tag: &[u8; 8], now_unix_s: i64, records: &T) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut buf = Vec::with_capacity(HEADER_LEN);
    buf.extend_from_slice(tag);
    buf.extend_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    buf.extend_from_slice(&now_unix_s.to_be_bytes());
    buf.extend_from_slice(&rmp_serde::to_vec(records)?);
    std::fs::write(family_path(dir, family), buf)?;
    Ok(())
}

/// Returns `None` when no snapshot file exists yet — a fresh cluster's
/// first startup, not an error.
fn read_family<T: DeserializeOwned>(dir: &Path, family: &str, expected_tag: &[u8; 8]) -> Result<Option<(i64, T)>> {
    let path = family_path(dir, family);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    if bytes.len() < HEADER_LEN {
        return Err(invalid_input(format!("{family} snapshot is truncated")));
    }
    if &bytes[0..8] != expected_tag {
        return Err(invalid_input(format!("{family} snapshot has the wrong format tag")));
    }
    let version = u16::from_be_bytes([bytes[8], bytes[9]]);
    if version != PROTOCOL_VERSION {
        warn!(family, version, current = PROTOCOL_VERSION, "snapshot protocol version mismatch, attempting to read anyway");
    }
    let timestamp = i64::from_be_bytes(bytes[10..18].try_into().unwrap());
    let records = rmp_serde::from_slice(&bytes[HEADER_LEN..])?;
    Ok(Some((timestamp, records)))
}

pub fn save_job_state(dir: &Path, now_unix_s: i64, jobs: &[latticed_sched::Job]) -> Result<()> {
    write_family(dir, "job_state", b"LATJOBST", now_unix_s, &jobs)
}

pub fn load_job_state(dir: &Path) -> Result<Option<(i64, Vec<latticed_sched::Job>)>> {
    read_family(dir, "job_state", b"LATJOBST")
}

pub fn save_node_state(dir: &Path, now_unix_s: i64, nodes: &[(String, latticed_nodes::NodeState)]) -> Result<()> {
    write_family(dir, "node_state", b"LATNODST", now_unix_s, &nodes)
}

pub fn load_node_state(dir: &Path) -> Result<Option<(i64, Vec<(String, latticed_nodes::NodeState)>)>> {
    read_family(dir, "node_state", b"LATNODST")
}

pub fn save_part_state(dir: &Path, now_unix_s: i64, partitions: &[latticed_nodes::Partition]) -> Result<()> {
    write_family(dir, "part_state", b"LATPARST", now_unix_s, &partitions)
}

pub fn load_part_state(dir: &Path) -> Result<Option<(i64, Vec<latticed_nodes::Partition>)>> {
    read_family(dir, "part_state", b"LATPARST")
}

pub fn save_assoc_mgr_state(dir: &Path, now_unix_s: i64, associations: &[latticed_assoc::Association]) -> Result<()> {
    write_family(dir, "assoc_mgr_state", b"LATASSOC", now_unix_s, &associations)
}

pub fn load_assoc_mgr_state(dir: &Path) -> Result<Option<(i64, Vec<latticed_assoc::Association>)>> {
    read_family(dir, "assoc_mgr_state", b"LATASSOC")
}

/// `priority_last_decay_ran` carries no record body, only the
/// timestamp in its header — the decay sweep just needs to know when
/// it last ran, not what it did.
pub fn save_priority_last_decay_ran(dir: &Path, now_unix_s: i64) -> Result<()> {
    write_family(dir, "priority_last_decay_ran", b"LATDECAY", now_unix_s, &())
}

pub fn load_priority_last_decay_ran(dir: &Path) -> Result<Option<i64>> {
    let loaded: Option<(i64, ())> = read_family(dir, "priority_last_decay_ran", b"LATDECAY")?;
    Ok(loaded.map(|(ts, ())| ts))
}

#[cfg(test)]
mod test {
    use super::*;
    use latticed_nodes::{BaseState, NodeFlags, NodeState};
    use test_log::test;

    #[test]
    fn node_state_round_trips() {
        let dir = tempdir();
        let nodes = vec![
            ("node01".to_string(), NodeState { base: BaseState::Idle, flags: NodeFlags::default() }),
            ("node02".to_string(), NodeState { base: BaseState::Down, flags: NodeFlags::default() }),
        ];
        save_node_state(dir.path(), 1_700_000_000, &nodes).unwrap();
        let (ts, loaded) = load_node_state(dir.path()).unwrap().unwrap();
        assert_eq!(ts, 1_700_000_000);
        assert_eq!(loaded, nodes);
    }

    #[test]
    fn missing_snapshot_is_none_not_an_error() {
        let dir = tempdir();
        assert!(load_job_state(dir.path()).unwrap().is_none());
    }

    #[test]
    fn wrong_tag_is_rejected() {
        let dir = tempdir();
        save_node_state(dir.path(), 0, &[]).unwrap();
        let bad_path = family_path(dir.path(), "node_state");
        let renamed = family_path(dir.path(), "job_state");
        std::fs::rename(&bad_path, &renamed).unwrap();
        assert!(load_job_state(dir.path()).is_err());
    }

    /// A throwaway directory under the OS temp root, cleaned up on drop.
    struct TempDir(PathBuf);
    impl TempDir {
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
    fn tempdir() -> TempDir {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = std::env::temp_dir().join(format!("latticed-ctld-test-{}-{unique}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }
}
