//! The controller binary's library half: configuration, the four
//! lock-rank discipline, the one real TCP transport in this
//! workspace, on-disk snapshot persistence, and the `Controller`
//! that ties every sibling crate's table/tree/pool together behind
//! one RPC entry point.

mod config;
mod controller;
mod locks;
mod net;
mod snapshot;

pub use config::{AssociationSeed, Config, NodeConfig, PartitionConfig};
pub use controller::{Controller, ControllerPhase};
pub use locks::{LockGuard, LockRank};
pub use net::{serve, TcpTransport};
