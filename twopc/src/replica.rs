use std::sync::Arc;

use labrpc::{
    anyhow::Result,
    log::{error, info, trace},
};

use crate::{CoordinatorClient, Kind, LocalStore, ReplicaService, Transaction};

/// Admission control for phase one.
pub trait VotePolicy: Send + Sync + 'static {
    /// Whether this replica accepts `tx`.
    fn accept(&self, tx: &Transaction) -> bool;
}

/// Accepts every transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysYes;

impl VotePolicy for AlwaysYes {
    fn accept(&self, _tx: &Transaction) -> bool {
        true
    }
}

impl<F> VotePolicy for F
where
    F: Fn(&Transaction) -> bool + Send + Sync + 'static,
{
    fn accept(&self, tx: &Transaction) -> bool {
        self(tx)
    }
}

/// Replica side of the protocol, backed by a [`LocalStore`].
///
/// Nothing is applied before commit, so abort has nothing to undo and
/// no per-transaction state is kept between calls.
pub struct Participant<S> {
    store: Arc<S>,
    policy: Box<dyn VotePolicy>,
}

impl<S: LocalStore> Participant<S> {
    /// Participant that votes yes on everything.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_policy(store, AlwaysYes)
    }

    /// Participant that consults `policy` before voting.
    pub fn with_policy(store: Arc<S>, policy: impl VotePolicy) -> Self {
        Self {
            store,
            policy: Box::new(policy),
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}

#[labrpc::async_trait]
impl<S: LocalStore> ReplicaService for Participant<S> {
    async fn get(&self, key: String) -> Result<String> {
        match self.store.get(&key) {
            Ok(v) => Ok(v.unwrap_or_default()),
            Err(e) => {
                error!("could not query {}: {:#}", key, e);
                Ok(String::new())
            }
        }
    }

    async fn vote(&self, tx: Transaction) -> Result<bool> {
        let yes = self.policy.accept(&tx);
        trace!("vote {} on {}", if yes { "yes" } else { "no" }, tx);
        Ok(yes)
    }

    async fn commit(&self, tx: Transaction) -> Result<bool> {
        // Store failures are not reported back: the coordinator already
        // counted this replica's yes vote.
        let applied = match tx.kind() {
            Kind::Insert => self.store.insert(tx.key(), tx.value()),
            Kind::Delete => self.store.delete(tx.key()),
            Kind::Get => Ok(()),
        };
        match applied {
            Ok(()) => trace!("committed {}", tx),
            Err(e) => error!("could not apply {}: {:#}", tx, e),
        }
        Ok(true)
    }

    async fn abort(&self, tx: Transaction) -> Result<bool> {
        trace!("aborted {}", tx);
        Ok(true)
    }

    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Announce the replica serving at `addr` to the coordinator.
pub async fn join(coordinator: &CoordinatorClient, addr: &str) -> Result<()> {
    coordinator.register_replica(addr.to_owned()).await?;
    info!("joined coordinator as {}", addr);
    Ok(())
}
