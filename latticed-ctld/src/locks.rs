//! Enforces the controller's fixed lock order — config, then jobs,
//! then the node/partition table — the same order `latticed_nodes`'s
//! own resource table already documents on its half of the bargain.
//! Taking a lock out of order is a programmer error, not a recoverable
//! condition, so a violation aborts the process rather than returning
//! a `Result` a caller could paper over.

use std::cell::Cell;

#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum LockRank {
    Config = 0,
    Jobs = 1,
    Nodes = 2,
    /// Nominal rank: in this implementation partitions live inside the
    /// same `RwLock` as `Nodes` (see `latticed_nodes::ResourceTable`),
    /// so nothing currently acquires this rank on its own. Kept so the
    /// four lock categories named in the lock-order rule stay named.
    Partitions = 3,
}

thread_local! {
    static HELD_RANK: Cell<Option<LockRank>> = const { Cell::new(None) };
}

/// RAII token proving the calling thread holds no lock ranked at or
/// below `rank` when it was acquired. Drop restores the previous
/// held-rank watermark, so nested scopes unwind correctly.
pub struct LockGuard {
    previous: Option<LockRank>,
}

impl LockGuard {
    /// Aborts if the calling thread already holds a lock whose rank is
    /// greater than or equal to `rank` — the lock-order rule is config
    /// -> jobs -> nodes -> partitions, strictly increasing, so a
    /// caller holding `Jobs` may acquire `Nodes` but never `Jobs` again
    /// nor `Config`.
    pub fn acquire(rank: LockRank) -> LockGuard {
        HELD_RANK.with(|held| {
            if let Some(current) = held.get() {
                if rank <= current {
                    panic!(
                        "lock order violation: attempted to acquire {rank:?} while holding {current:?}"
                    );
                }
            }
            let previous = held.replace(Some(rank));
            LockGuard { previous }
        })
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        HELD_RANK.with(|held| held.set(self.previous));
    }
}
