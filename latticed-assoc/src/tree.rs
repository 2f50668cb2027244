//! The association tree: a cluster/account/user/partition hierarchy
//! carrying inherited resource limits and QoS grants. Generalizes
//! `submerge-txn`'s `Transaction { time, thunk, state }` shape (kept
//! as `Association { id, parent, ..., limits }`) from a five-state
//! replication protocol into the tree-of-policy-records domain; the
//! arena-of-indices layout (`AssocId(u32)`, no nested-set `lft`/`rgt`
//! columns) follows the redesign direction of dropping the legacy
//! renumbering protocol in favor of lineage-string prefix rewrites.

use crate::limits::Limits;
use crate::txn::{AccountingStore, TransactionRow};
use latticed_base::{access_denied, constraint_violation, invalid_input, not_found, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct AssocId(pub u32);

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Association {
    pub id: AssocId,
    pub parent: Option<AssocId>,
    pub lineage: String,
    pub cluster: String,
    pub account: String,
    pub user: Option<String>,
    pub partition: Option<String>,
    pub is_default: bool,
    pub deleted: bool,
    pub default_qos_id: Option<String>,
    /// `+name`/`-name` tokens applied, in ancestor-to-descendant
    /// order, on top of the accumulated QoS set.
    pub qos_delta: Vec<String>,
    pub limits: Limits,
    pub coordinators: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct NewAssociation {
    pub cluster: String,
    pub account: String,
    pub user: Option<String>,
    pub partition: Option<String>,
    pub is_default: bool,
    pub default_qos_id: Option<String>,
    pub qos_delta: Vec<String>,
    pub limits: Limits,
    pub coordinators: Vec<String>,
}

impl NewAssociation {
    pub fn account(cluster: impl Into<String>, account: impl Into<String>) -> NewAssociation {
        NewAssociation {
            cluster: cluster.into(),
            account: account.into(),
            user: None,
            partition: None,
            is_default: false,
            default_qos_id: None,
            qos_delta: Vec::new(),
            limits: Limits::default(),
            coordinators: Vec::new(),
        }
    }

    pub fn user(
        cluster: impl Into<String>,
        account: impl Into<String>,
        user: impl Into<String>,
    ) -> NewAssociation {
        NewAssociation { user: Some(user.into()), ..NewAssociation::account(cluster, account) }
    }

    pub fn with_limits(mut self, limits: Limits) -> NewAssociation {
        self.limits = limits;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct BulkOutcome {
    pub added: Vec<AssocId>,
    pub already_existed: usize,
    /// Ids whose cached effective limits/QoS should be invalidated —
    /// the new rows plus their parent, whose child count changed.
    pub cache_invalidate: Vec<AssocId>,
}

/// `(cluster, account, user, partition)` uniquely identifies a row.
type RowKey = (String, String, Option<String>, Option<String>);

pub struct AssocTree {
    records: Vec<Option<Association>>,
    by_key: HashMap<RowKey, AssocId>,
    user_default: HashMap<(String, String), AssocId>,
    store: Arc<dyn AccountingStore>,
}

fn row_key(a: &Association) -> RowKey {
    (a.cluster.clone(), a.account.clone(), a.user.clone(), a.partition.clone())
}

impl AssocTree {
    /// Builds the tree with a single `root` account record at
    /// cluster `cluster`, owning no parent.
    pub fn new(cluster: impl Into<String>, store: Arc<dyn AccountingStore>) -> AssocTree {
        let cluster = cluster.into();
        let root = Association {
            id: AssocId(0),
            parent: None,
            lineage: "/root/".to_string(),
            cluster: cluster.clone(),
            account: "root".to_string(),
            user: None,
            partition: None,
            is_default: true,
            deleted: false,
            default_qos_id: None,
            qos_delta: Vec::new(),
            limits: Limits::default(),
            coordinators: Vec::new(),
        };
        let mut by_key = HashMap::new();
        by_key.insert(row_key(&root), root.id);
        AssocTree { records: vec![Some(root)], by_key, user_default: HashMap::new(), store }
    }

    pub fn root(&self) -> AssocId {
        AssocId(0)
    }

    pub fn get(&self, id: AssocId) -> Option<&Association> {
        self.records.get(id.0 as usize).and_then(|r| r.as_ref())
    }

    fn get_mut(&mut self, id: AssocId) -> Result<&mut Association> {
        self.records
            .get_mut(id.0 as usize)
            .and_then(|r| r.as_mut())
            .ok_or_else(|| not_found(format!("association {} unknown", id.0)))
    }

    /// A user segment always carries the literal `0-` lineage prefix
    /// (`/root/acct/0-user/`), not a position index — ground truth
    /// emits the same constant prefix for every user row regardless of
    /// where it falls in a batch.
    fn segment_for(input: &NewAssociation) -> String {
        match &input.user {
            Some(u) => format!("0-{u}"),
            None => input.account.clone(),
        }
    }

    fn insert(
        &mut self,
        parent: AssocId,
        input: NewAssociation,
        segment: String,
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<AssocId> {
        let parent_rec = self.get(parent).ok_or_else(|| not_found("parent association unknown"))?;
        if parent_rec.deleted {
            return Err(invalid_input("cannot add under a deleted association"));
        }
        let lineage = format!("{}{}/", parent_rec.lineage, segment);
        let cluster = input.cluster.clone();
        let id = AssocId(self.records.len() as u32);
        let rec = Association {
            id,
            parent: Some(parent),
            lineage,
            cluster: cluster.clone(),
            account: input.account,
            user: input.user,
            partition: input.partition,
            is_default: input.is_default,
            deleted: false,
            default_qos_id: input.default_qos_id,
            qos_delta: input.qos_delta,
            limits: input.limits,
            coordinators: input.coordinators,
        };
        self.by_key.insert(row_key(&rec), id);
        if rec.is_default {
            if let Some(user) = &rec.user {
                self.clear_other_defaults(&cluster, user, id)?;
                self.user_default.insert((cluster.clone(), user.clone()), id);
            }
        }
        self.validate_default_qos(&rec)?;
        self.records.push(Some(rec));
        self.store.record(TransactionRow {
            timestamp_unix_ms,
            action: "add".to_string(),
            actor: actor.to_string(),
            target: id,
            cluster,
            info: String::new(),
        });
        Ok(id)
    }

    fn clear_other_defaults(&mut self, cluster: &str, user: &str, except: AssocId) -> Result<()> {
        let ids: Vec<AssocId> = self
            .records
            .iter()
            .flatten()
            .filter(|a| {
                a.id != except
                    && a.cluster == cluster
                    && a.user.as_deref() == Some(user)
                    && a.is_default
                    && !a.deleted
            })
            .map(|a| a.id)
            .collect();
        for id in ids {
            self.get_mut(id)?.is_default = false;
        }
        Ok(())
    }

    fn validate_default_qos(&self, rec: &Association) -> Result<()> {
        if let Some(default_qos) = &rec.default_qos_id {
            let reachable = self.resolve_qos(rec.id)?;
            if !reachable.contains(default_qos) {
                return Err(constraint_violation(format!(
                    "default_qos_id `{default_qos}` unreachable from its own association"
                )));
            }
        }
        Ok(())
    }

    pub fn add(
        &mut self,
        parent: AssocId,
        input: NewAssociation,
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<AssocId> {
        let segment = Self::segment_for(&input);
        self.insert(parent, input, segment, timestamp_unix_ms, actor)
    }

    /// Bulk add under one parent: skips rows whose `(cluster, account,
    /// user, partition)` key already exists.
    pub fn add_cond(
        &mut self,
        parent: AssocId,
        entries: Vec<NewAssociation>,
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<BulkOutcome> {
        let mut outcome = BulkOutcome::default();
        for input in entries {
            let key = (
                input.cluster.clone(),
                input.account.clone(),
                input.user.clone(),
                input.partition.clone(),
            );
            if self.by_key.contains_key(&key) {
                outcome.already_existed += 1;
                continue;
            }
            let segment = Self::segment_for(&input);
            let id = self.insert(parent, input, segment, timestamp_unix_ms, actor)?;
            outcome.added.push(id);
        }
        if !outcome.added.is_empty() {
            outcome.cache_invalidate = outcome.added.clone();
            outcome.cache_invalidate.push(parent);
        }
        Ok(outcome)
    }

    pub fn modify(
        &mut self,
        id: AssocId,
        f: impl FnOnce(&mut Association),
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<()> {
        let (cluster, user_default_key) = {
            let rec = self.get_mut(id)?;
            f(rec);
            (rec.cluster.clone(), rec.user.clone().map(|u| (rec.cluster.clone(), u)))
        };
        if let Some(key) = user_default_key {
            let is_default = self.get(id).map(|a| a.is_default).unwrap_or(false);
            if is_default {
                self.clear_other_defaults(&key.0, &key.1, id)?;
                self.user_default.insert(key, id);
            }
        }
        let rec = self.get(id).cloned().expect("just modified");
        self.validate_default_qos(&rec)?;
        self.store.record(TransactionRow {
            timestamp_unix_ms,
            action: "modify".to_string(),
            actor: actor.to_string(),
            target: id,
            cluster,
            info: String::new(),
        });
        Ok(())
    }

    pub fn modify_cond(
        &mut self,
        predicate: impl Fn(&Association) -> bool,
        f: impl Fn(&mut Association),
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<Vec<AssocId>> {
        let ids: Vec<AssocId> =
            self.records.iter().flatten().filter(|a| predicate(a)).map(|a| a.id).collect();
        for id in &ids {
            self.modify(*id, &f, timestamp_unix_ms, actor)?;
        }
        Ok(ids)
    }

    /// Marks every matching association deleted, cascading to every
    /// descendant so invariant 6 (no non-deleted row parents a deleted
    /// one) always holds.
    pub fn remove_cond(
        &mut self,
        predicate: impl Fn(&Association) -> bool,
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<Vec<AssocId>> {
        let roots: Vec<AssocId> =
            self.records.iter().flatten().filter(|a| predicate(a)).map(|a| a.id).collect();
        let mut removed = Vec::new();
        for root in roots {
            let lineage_prefix = match self.get(root) {
                Some(a) if !a.deleted => a.lineage.clone(),
                _ => continue,
            };
            let affected: Vec<AssocId> = self
                .records
                .iter()
                .flatten()
                .filter(|a| !a.deleted && a.lineage.starts_with(&lineage_prefix))
                .map(|a| a.id)
                .collect();
            for id in affected {
                let cluster = self.get_mut(id)?.cluster.clone();
                self.get_mut(id)?.deleted = true;
                self.store.record(TransactionRow {
                    timestamp_unix_ms,
                    action: "remove".to_string(),
                    actor: actor.to_string(),
                    target: id,
                    cluster,
                    info: String::new(),
                });
                removed.push(id);
            }
        }
        Ok(removed)
    }

    /// Detaches `id`'s subtree and reattaches it under `new_parent`,
    /// rewriting the `lineage` of `id` and every descendant — the
    /// single-prefix-rewrite replacement for the legacy lft/rgt
    /// renumbering protocol.
    pub fn move_parent(
        &mut self,
        id: AssocId,
        new_parent: AssocId,
        timestamp_unix_ms: u64,
        actor: &str,
    ) -> Result<()> {
        let old_lineage = self.get(id).ok_or_else(|| not_found("association unknown"))?.lineage.clone();
        let new_parent_lineage =
            self.get(new_parent).ok_or_else(|| not_found("new parent unknown"))?.lineage.clone();
        if new_parent_lineage.starts_with(&old_lineage) {
            return Err(invalid_input("cannot move an association under its own descendant"));
        }
        let segment = old_lineage
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        let new_lineage = format!("{new_parent_lineage}{segment}/");
        let affected: Vec<AssocId> = self
            .records
            .iter()
            .flatten()
            .filter(|a| a.lineage.starts_with(&old_lineage))
            .map(|a| a.id)
            .collect();
        for aid in &affected {
            let rec = self.get_mut(*aid)?;
            let suffix = rec.lineage[old_lineage.len()..].to_string();
            rec.lineage = new_lineage.clone() + &suffix;
        }
        self.get_mut(id)?.parent = Some(new_parent);
        let cluster = self.get(id).unwrap().cluster.clone();
        self.store.record(TransactionRow {
            timestamp_unix_ms,
            action: "move_parent".to_string(),
            actor: actor.to_string(),
            target: id,
            cluster,
            info: format!("new_parent={}", new_parent.0),
        });
        Ok(())
    }

    /// Effective value of a limit selector at `id`, coalescing up the
    /// parent chain until a `Some` is found.
    pub fn effective_limit<T>(&self, id: AssocId, selector: impl Fn(&Limits) -> Option<T>) -> Option<T> {
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let rec = self.get(cid)?;
            if let Some(v) = selector(&rec.limits) {
                return Some(v);
            }
            cur = rec.parent;
        }
        None
    }

    /// Resolved QoS set: walk root-to-`id`, applying each ancestor's
    /// `+name`/`-name` delta tokens against the accumulated set in
    /// order (a bare `name` token is shorthand for `+name`).
    pub fn resolve_qos(&self, id: AssocId) -> Result<BTreeSet<String>> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(cid) = cur {
            let rec = self.get(cid).ok_or_else(|| not_found(format!("association {} unknown", cid.0)))?;
            chain.push(rec);
            cur = rec.parent;
        }
        chain.reverse();
        let mut set = BTreeSet::new();
        for rec in chain {
            for token in &rec.qos_delta {
                if let Some(name) = token.strip_prefix('+') {
                    set.insert(name.to_string());
                } else if let Some(name) = token.strip_prefix('-') {
                    set.remove(name);
                } else {
                    set.insert(token.clone());
                }
            }
        }
        Ok(set)
    }

    /// `true` if `caller` is registered as a coordinator at `target`
    /// or at any ancestor of it.
    pub fn is_coordinator(&self, caller: &str, target: AssocId) -> bool {
        let mut cur = Some(target);
        while let Some(cid) = cur {
            let Some(rec) = self.get(cid) else { return false };
            if rec.coordinators.iter().any(|c| c == caller) {
                return true;
            }
            cur = rec.parent;
        }
        false
    }

    /// Authorizes a coordinator's request to grant `qos_to_grant` at
    /// `target`: `caller` must be a coordinator somewhere up the
    /// lineage, and every QoS granted must already be in the
    /// coordinator's own resolved set at the ancestor where they were
    /// registered.
    pub fn authorize_coordinator_grant(
        &self,
        caller: &str,
        target: AssocId,
        qos_to_grant: &[String],
    ) -> Result<()> {
        let mut cur = Some(target);
        while let Some(cid) = cur {
            let rec = self.get(cid).ok_or_else(|| not_found("association unknown"))?;
            if rec.coordinators.iter().any(|c| c == caller) {
                let held = self.resolve_qos(cid)?;
                if qos_to_grant.iter().all(|q| held.contains(q)) {
                    return Ok(());
                }
                return Err(invalid_input(format!(
                    "coordinator {caller} cannot grant QoS outside their own set"
                )));
            }
            cur = rec.parent;
        }
        Err(access_denied(format!(
            "{caller} is not a coordinator of association {} or any ancestor",
            target.0
        )))
    }

    /// Every live record, for snapshotting. Deleted rows are included —
    /// a snapshot restore must reproduce invariant 6 exactly, not just
    /// the currently-visible subset.
    pub fn all(&self) -> impl Iterator<Item = &Association> {
        self.records.iter().flatten()
    }

    /// Rebuilds a tree from a snapshot's association rows, which must
    /// include the root record at `AssocId(0)`. Reconstructs `by_key`
    /// and `user_default` from scratch rather than trusting them to
    /// have been persisted separately.
    pub fn restore(records: Vec<Association>, store: Arc<dyn AccountingStore>) -> AssocTree {
        let mut by_key = HashMap::new();
        let mut user_default = HashMap::new();
        let mut slots: Vec<Option<Association>> = Vec::new();
        for rec in records {
            let idx = rec.id.0 as usize;
            if slots.len() <= idx {
                slots.resize(idx + 1, None);
            }
            by_key.insert(row_key(&rec), rec.id);
            if rec.is_default && !rec.deleted {
                if let Some(user) = &rec.user {
                    user_default.insert((rec.cluster.clone(), user.clone()), rec.id);
                }
            }
            slots[idx] = Some(rec);
        }
        AssocTree { records: slots, by_key, user_default, store }
    }

    pub fn lookup(
        &self,
        cluster: &str,
        account: &str,
        user: Option<&str>,
        partition: Option<&str>,
    ) -> Option<AssocId> {
        let key = (
            cluster.to_string(),
            account.to_string(),
            user.map(str::to_string),
            partition.map(str::to_string),
        );
        self.by_key.get(&key).copied()
    }
}
