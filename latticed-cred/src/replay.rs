//! Per-node replay cache and revocation list, keyed the way the spec
//! describes: `(job_id, step_id)` for replay de-duplication, bare
//! `job_id` for revocation.

use crate::credential::{SignedCredential, StepId};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplayOutcome {
    Fresh,
    /// An identical credential for this `(job_id, step_id)` was
    /// already accepted and is still within its expiration window —
    /// the caller should treat this as a no-op success, not an error.
    Replayed,
}

#[derive(Default)]
pub struct ReplayCache {
    entries: HashMap<(u64, StepId), (Vec<u8>, u64)>,
}

impl ReplayCache {
    pub fn new() -> ReplayCache {
        ReplayCache::default()
    }

    /// Records `signed` as accepted at `now_ms` and reports whether an
    /// identical, still-valid credential was already on file for this
    /// key.
    pub fn observe(&mut self, signed: &SignedCredential, now_ms: u64) -> ReplayOutcome {
        let key = (signed.credential.job_id, signed.credential.step_id);
        if let Some((sig, expiration)) = self.entries.get(&key) {
            if *sig == signed.signature && now_ms < *expiration {
                return ReplayOutcome::Replayed;
            }
        }
        self.entries.insert(key, (signed.signature.clone(), signed.credential.expiration_unix_ms));
        ReplayOutcome::Fresh
    }

    /// Drops cache entries whose credential has expired, bounding
    /// memory growth over a long-running node daemon's lifetime.
    pub fn sweep_expired(&mut self, now_ms: u64) {
        self.entries.retain(|_, (_, expiration)| *expiration > now_ms);
    }
}

/// Tracks killed jobs so a late-arriving (already-superseded)
/// credential can't resurrect them; an entry is kept until
/// `expiration + grace` of the credential that was current when the
/// kill happened.
#[derive(Default)]
pub struct RevocationList {
    keep_until: HashMap<u64, u64>,
}

impl RevocationList {
    pub fn new() -> RevocationList {
        RevocationList::default()
    }

    pub fn revoke(&mut self, job_id: u64, credential_expiration_unix_ms: u64, grace_ms: u64) {
        let keep_until = credential_expiration_unix_ms + grace_ms;
        self.keep_until
            .entry(job_id)
            .and_modify(|existing| *existing = (*existing).max(keep_until))
            .or_insert(keep_until);
    }

    pub fn is_revoked(&self, job_id: u64, now_ms: u64) -> bool {
        self.keep_until.get(&job_id).is_some_and(|until| now_ms < *until)
    }

    pub fn sweep_expired(&mut self, now_ms: u64) {
        self.keep_until.retain(|_, until| *until > now_ms);
    }
}
