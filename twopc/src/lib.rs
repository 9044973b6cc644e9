#![deny(missing_docs)]
#![deny(clippy::all)]
//! Replicated key/value store coordinated by two-phase commit.
//!
//! A single [`TransactionManager`] assigns transaction ids, collects a
//! unanimous vote from every registered replica, and then fans the commit out.
//! Reads skip the protocol and go to one replica picked at random.

labrpc::service! {
    /// Verbs a replica exposes to the coordinator.
    service replica_svc {
        /// Read the local value of `key`, empty if absent.
        fn get(key: String) -> String;
        /// Phase one: may this replica apply `tx`?
        fn vote(tx: Transaction) -> bool;
        /// Phase two: apply `tx`.
        fn commit(tx: Transaction) -> bool;
        /// Phase two: forget `tx`.
        fn abort(tx: Transaction) -> bool;
        /// Liveness check without side effects.
        fn probe() -> ();
    }
}

labrpc::service! {
    /// Verbs the coordinator exposes to clients and joining replicas.
    service coordinator_svc {
        fn put(key: String, value: String) -> bool;
        fn del(key: String) -> bool;
        fn get(key: String) -> String;
        fn register_replica(addr: String) -> ();
    }
}

pub use coordinator_svc::{
    Client as CoordinatorClient, Server as CoordinatorServer, Service as CoordinatorService,
};
pub use replica_svc::{Client as ReplicaClient, Server as ReplicaServer, Service as ReplicaService};

/// A coordinator and its replicas in one process.
pub mod cluster;
mod config;
mod coordinator;
mod error;
mod manager;
/// Replica-side protocol handler.
pub mod replica;
mod replica_set;
mod store;
mod transaction;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use manager::TransactionManager;
pub use replica::{AlwaysYes, Participant, VotePolicy};
pub use replica_set::{ReplicaEndpoint, ReplicaSet};
pub use store::{LocalStore, MemStore};
pub use transaction::{IdGenerator, Kind, Transaction};
