//! Every association mutation writes a row here before it's
//! considered committed — the accounting-transaction ledger the real
//! MySQL-backed storage plugin would own. That backend is out of
//! scope; this workspace defines the collaborator interface plus one
//! in-memory reference implementation, matching `submerge-txn`'s
//! `Store` trait (`get`/`put`/`abort`) generalized from a replicated
//! key-value store to an append-only audit log.

use crate::tree::AssocId;
use std::sync::Mutex;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransactionRow {
    pub timestamp_unix_ms: u64,
    pub action: String,
    pub actor: String,
    pub target: AssocId,
    pub cluster: String,
    pub info: String,
}

pub trait AccountingStore: Send + Sync {
    fn record(&self, row: TransactionRow);
}

#[derive(Default)]
pub struct InMemoryAccountingStore {
    rows: Mutex<Vec<TransactionRow>>,
}

impl InMemoryAccountingStore {
    pub fn new() -> InMemoryAccountingStore {
        InMemoryAccountingStore::default()
    }

    pub fn rows(&self) -> Vec<TransactionRow> {
        self.rows.lock().unwrap().clone()
    }
}

impl AccountingStore for InMemoryAccountingStore {
    fn record(&self, row: TransactionRow) {
        self.rows.lock().unwrap().push(row);
    }
}
