use labrpc::{anyhow, async_trait, client::Client};
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

use crate::{replica_svc, Error, ReplicaClient, Result, Transaction};

/// A remote participant as seen from the coordinator.
///
/// Entries are identified by address: two handles with the same address are
/// the same replica.
#[async_trait]
pub trait ReplicaEndpoint: Clone + Send + Sync + 'static {
    /// Address the replica was registered under.
    fn addr(&self) -> &str;
    /// Read `key` from the replica's store.
    async fn get(&self, key: String) -> anyhow::Result<String>;
    /// Ask the replica to vote on `tx`.
    async fn vote(&self, tx: Transaction) -> anyhow::Result<bool>;
    /// Tell the replica to apply `tx`.
    async fn commit(&self, tx: Transaction) -> anyhow::Result<bool>;
    /// Tell the replica to drop `tx`.
    async fn abort(&self, tx: Transaction) -> anyhow::Result<bool>;
    /// Check that the replica is alive.
    async fn probe(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl ReplicaEndpoint for ReplicaClient {
    fn addr(&self) -> &str {
        Client::server_id(self)
    }
    async fn get(&self, key: String) -> anyhow::Result<String> {
        replica_svc::Client::get(self, key).await
    }
    async fn vote(&self, tx: Transaction) -> anyhow::Result<bool> {
        replica_svc::Client::vote(self, tx).await
    }
    async fn commit(&self, tx: Transaction) -> anyhow::Result<bool> {
        replica_svc::Client::commit(self, tx).await
    }
    async fn abort(&self, tx: Transaction) -> anyhow::Result<bool> {
        replica_svc::Client::abort(self, tx).await
    }
    async fn probe(&self) -> anyhow::Result<()> {
        replica_svc::Client::probe(self).await
    }
}

/// Membership table of the coordinator.
///
/// Every operation takes the lock only for the list operation itself, so
/// callers never hold it across a remote call.
pub struct ReplicaSet<E> {
    members: Mutex<Vec<E>>,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl<E: ReplicaEndpoint> ReplicaSet<E> {
    /// Empty set picking replicas with an entropy-seeded generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Empty set picking replicas with `rng`.
    pub fn with_rng(rng: impl RngCore + Send + 'static) -> Self {
        Self {
            members: Mutex::new(Vec::new()),
            rng: Mutex::new(Box::new(rng)),
        }
    }

    /// Append `endpoint`. Registering the same replica twice yields two
    /// entries.
    pub fn add(&self, endpoint: E) {
        self.members.lock().push(endpoint);
    }

    /// Drop every entry whose address matches one of `dead`. Returns the
    /// number of entries removed.
    pub fn remove_all(&self, dead: &[E]) -> usize {
        if dead.is_empty() {
            return 0;
        }
        let mut members = self.members.lock();
        let before = members.len();
        members.retain(|m| !dead.iter().any(|d| d.addr() == m.addr()));
        before - members.len()
    }

    /// One member chosen uniformly at random.
    pub fn pick_random(&self) -> Result<E> {
        let members = self.members.lock();
        if members.is_empty() {
            return Err(Error::NoReplicasAvailable);
        }
        let i = self.rng.lock().gen_range(0..members.len());
        Ok(members[i].clone())
    }

    /// Current members, detached from later changes.
    pub fn snapshot(&self) -> Vec<E> {
        self.members.lock().clone()
    }

    /// Addresses of the current members, in registration order.
    pub fn addrs(&self) -> Vec<String> {
        self.members
            .lock()
            .iter()
            .map(|m| m.addr().to_owned())
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether membership is empty.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }
}

impl<E: ReplicaEndpoint> Default for ReplicaSet<E> {
    fn default() -> Self {
        Self::new()
    }
}
