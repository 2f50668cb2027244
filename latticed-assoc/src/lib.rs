//! The association tree: cluster/account/user/partition hierarchy
//! carrying inherited limits, QoS grants, and coordinator
//! authorization. Generalizes `submerge-txn`'s tree-shaped
//! `Transaction`/`State` idiom into an accounting-policy domain.

mod limits;
mod tree;
mod txn;

#[cfg(test)]
mod test;

pub use limits::Limits;
pub use tree::{AssocId, AssocTree, Association, BulkOutcome, NewAssociation};
pub use txn::{AccountingStore, InMemoryAccountingStore, TransactionRow};
