use futures::future::join_all;
use labrpc::{
    anyhow,
    log::{debug, error, info, warn},
    tokio::time,
};
use rand::RngCore;
use std::future::Future;

use crate::{Config, Error, IdGenerator, Kind, ReplicaEndpoint, ReplicaSet, Result, Transaction};

/// Outcome of asking one replica to vote.
enum Ballot {
    Yes,
    No,
    /// Neither the vote nor the follow-up probe went through.
    Dead,
}

/// The coordinator: assigns transaction ids, runs two-phase commit over
/// every registered replica, and serves reads from a random one.
pub struct TransactionManager<E> {
    replicas: ReplicaSet<E>,
    ids: IdGenerator,
    config: Config,
}

impl<E: ReplicaEndpoint> TransactionManager<E> {
    /// Manager with no replicas.
    pub fn new(config: Config) -> Self {
        Self::from_set(config, ReplicaSet::new())
    }

    /// Manager whose reads pick replicas with `rng`.
    pub fn with_rng(config: Config, rng: impl RngCore + Send + 'static) -> Self {
        Self::from_set(config, ReplicaSet::with_rng(rng))
    }

    fn from_set(config: Config, replicas: ReplicaSet<E>) -> Self {
        Self {
            replicas,
            ids: IdGenerator::new(),
            config,
        }
    }

    /// Settings in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current membership.
    pub fn replicas(&self) -> &ReplicaSet<E> {
        &self.replicas
    }

    /// Take part in every transaction from now on.
    pub fn add_replica(&self, replica: E) {
        info!("adding replica at {}", replica.addr());
        self.replicas.add(replica);
    }

    /// Store `value` under `key` on every replica. `true` iff all of them
    /// voted yes.
    pub async fn put(&self, key: String, value: String) -> bool {
        self.write(Kind::Insert, key, Some(value)).await.is_ok()
    }

    /// Remove `key` from every replica. `true` iff all of them voted yes.
    pub async fn del(&self, key: String) -> bool {
        self.write(Kind::Delete, key, None).await.is_ok()
    }

    /// Value of `key` on a random replica; empty when the key is absent or
    /// the read failed.
    pub async fn get(&self, key: String) -> String {
        match self.try_get(&key).await {
            Ok(v) => v,
            Err(e) => {
                error!("get {} failed: {}. Try again.", key, e);
                String::new()
            }
        }
    }

    /// Read `key` from one replica picked uniformly at random.
    ///
    /// A failed read is neither retried elsewhere nor used to prune
    /// membership.
    pub async fn try_get(&self, key: &str) -> Result<String> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let replica = self.replicas.pick_random()?;
        self.bounded(&replica, "get", replica.get(key.to_owned()))
            .await
    }

    /// Run one state-changing transaction through both phases.
    ///
    /// Returns the committed transaction, or why it was aborted. A failed
    /// transaction is dropped; resubmitting builds a new one with a new id.
    pub async fn write(
        &self,
        kind: Kind,
        key: String,
        value: Option<String>,
    ) -> Result<Transaction> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        let tx = Transaction::new(self.ids.next_id(), kind, key, value);
        debug!("begin {}", tx);

        match self.phase_one(&tx).await {
            Ok(()) => {
                self.commit(&tx).await;
                Ok(tx)
            }
            Err(e) => {
                error!("transaction aborted: {}: {}", tx, e);
                Err(e)
            }
        }
    }

    /// Collect a vote from every member of the current snapshot. Members
    /// that fail both the vote and the probe are pruned once every ballot is
    /// in.
    async fn phase_one(&self, tx: &Transaction) -> Result<()> {
        let voters = self.replicas.snapshot();
        if voters.is_empty() {
            if self.config.commit_without_replicas {
                warn!("no replicas, committing {} vacuously", tx);
                return Ok(());
            }
            return Err(Error::NoReplicasAvailable);
        }

        let ballots = join_all(voters.iter().map(|r| self.ballot(r, tx))).await;

        let dead: Vec<E> = voters
            .iter()
            .zip(ballots.iter())
            .filter(|(_, b)| matches!(b, Ballot::Dead))
            .map(|(r, _)| r.clone())
            .collect();
        let removed = self.replicas.remove_all(&dead);
        if removed > 0 {
            info!(
                "removed {} replica entries after unsuccessful probe, {} left",
                removed,
                self.replicas.len()
            );
        }

        let rejected = ballots
            .iter()
            .filter(|b| !matches!(b, Ballot::Yes))
            .count();
        if rejected == 0 {
            Ok(())
        } else {
            Err(Error::VoteRejected {
                id: tx.id(),
                rejected,
                voters: ballots.len(),
            })
        }
    }

    async fn ballot(&self, replica: &E, tx: &Transaction) -> Ballot {
        match self.bounded(replica, "vote", replica.vote(tx.clone())).await {
            Ok(true) => Ballot::Yes,
            Ok(false) => {
                warn!("{} voted no on {}", replica.addr(), tx);
                Ballot::No
            }
            Err(e) => {
                error!("could not collect vote: {}", e);
                match self.bounded(replica, "probe", replica.probe()).await {
                    Ok(()) => Ballot::No,
                    Err(e) => {
                        error!("{}", e);
                        Ballot::Dead
                    }
                }
            }
        }
    }

    /// Best-effort fan-out to the current members: a failed commit is
    /// logged and otherwise ignored.
    async fn commit(&self, tx: &Transaction) {
        let members = self.replicas.snapshot();
        let results = join_all(
            members
                .iter()
                .map(|r| self.bounded(r, "commit", r.commit(tx.clone()))),
        )
        .await;
        let failed = results
            .into_iter()
            .filter_map(|r| r.err())
            .inspect(|e| error!("could not commit {}: {}", tx, e))
            .count();
        info!(
            "committed {} on {} of {} replicas",
            tx,
            members.len() - failed,
            members.len()
        );
    }

    /// Apply the configured timeout to one remote call.
    async fn bounded<T>(
        &self,
        replica: &E,
        what: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T> {
        let timeout = self.config.rpc_timeout;
        match time::timeout(timeout, call).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(Error::Transport {
                addr: replica.addr().to_owned(),
                reason: format!("{}: {:#}", what, e),
            }),
            Err(_) => Err(Error::Transport {
                addr: replica.addr().to_owned(),
                reason: format!("{} timed out after {:?}", what, timeout),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LocalStore, MemStore};
    use labrpc::{anyhow::anyhow, async_trait, tokio};
    use parking_lot::Mutex;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    };
    use std::time::Duration;

    #[derive(Clone, Copy, PartialEq)]
    enum Reply {
        Yes,
        No,
        Fail,
        Hang,
    }

    struct State {
        vote: Mutex<Reply>,
        probe_ok: AtomicBool,
        commit_ok: AtomicBool,
        votes: Mutex<Vec<u64>>,
        commits: AtomicUsize,
        probes: AtomicUsize,
        gets: AtomicUsize,
        store: MemStore,
    }

    /// Scripted in-memory replica.
    #[derive(Clone)]
    struct Fake {
        addr: String,
        state: Arc<State>,
    }

    impl Fake {
        fn new(addr: &str) -> Self {
            Self {
                addr: addr.to_owned(),
                state: Arc::new(State {
                    vote: Mutex::new(Reply::Yes),
                    probe_ok: AtomicBool::new(true),
                    commit_ok: AtomicBool::new(true),
                    votes: Mutex::new(Vec::new()),
                    commits: AtomicUsize::new(0),
                    probes: AtomicUsize::new(0),
                    gets: AtomicUsize::new(0),
                    store: MemStore::new(),
                }),
            }
        }

        /// Vote with `reply`; fail the probe too when `alive` is false.
        fn script(&self, reply: Reply, alive: bool) {
            *self.state.vote.lock() = reply;
            self.state.probe_ok.store(alive, Ordering::SeqCst);
        }

        fn votes(&self) -> usize {
            self.state.votes.lock().len()
        }

        fn commits(&self) -> usize {
            self.state.commits.load(Ordering::SeqCst)
        }

        fn value(&self, key: &str) -> Option<String> {
            self.state.store.get(key).unwrap()
        }
    }

    #[async_trait]
    impl ReplicaEndpoint for Fake {
        fn addr(&self) -> &str {
            &self.addr
        }

        async fn get(&self, key: String) -> anyhow::Result<String> {
            self.state.gets.fetch_add(1, Ordering::SeqCst);
            if *self.state.vote.lock() == Reply::Fail {
                return Err(anyhow!("connection refused"));
            }
            Ok(self.state.store.get(&key)?.unwrap_or_default())
        }

        async fn vote(&self, tx: Transaction) -> anyhow::Result<bool> {
            self.state.votes.lock().push(tx.id());
            let reply = *self.state.vote.lock();
            match reply {
                Reply::Yes => Ok(true),
                Reply::No => Ok(false),
                Reply::Fail => Err(anyhow!("connection refused")),
                Reply::Hang => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(true)
                }
            }
        }

        async fn commit(&self, tx: Transaction) -> anyhow::Result<bool> {
            self.state.commits.fetch_add(1, Ordering::SeqCst);
            if !self.state.commit_ok.load(Ordering::SeqCst) {
                return Err(anyhow!("connection reset"));
            }
            match tx.kind() {
                Kind::Insert => self.state.store.insert(tx.key(), tx.value())?,
                Kind::Delete => self.state.store.delete(tx.key())?,
                Kind::Get => {}
            }
            Ok(true)
        }

        async fn abort(&self, _tx: Transaction) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn probe(&self) -> anyhow::Result<()> {
            self.state.probes.fetch_add(1, Ordering::SeqCst);
            if self.state.probe_ok.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(anyhow!("connection refused"))
            }
        }
    }

    fn config() -> Config {
        Config {
            rpc_timeout: Duration::from_millis(100),
            ..Config::default()
        }
    }

    fn manager(n: usize) -> (TransactionManager<Fake>, Vec<Fake>) {
        let tm = TransactionManager::with_rng(config(), StdRng::seed_from_u64(1));
        let fakes: Vec<Fake> = (1..=n).map(|i| Fake::new(&format!("r{}", i))).collect();
        for f in &fakes {
            tm.add_replica(f.clone());
        }
        (tm, fakes)
    }

    #[tokio::test]
    async fn test_unanimous_put_commits_everywhere() {
        let (tm, fakes) = manager(3);
        assert!(tm.put("a".into(), "1".into()).await);
        for f in &fakes {
            assert_eq!(f.votes(), 1);
            assert_eq!(f.commits(), 1);
            assert_eq!(f.value("a"), Some("1".to_owned()));
        }
        assert_eq!(tm.get("a".into()).await, "1");
    }

    #[tokio::test]
    async fn test_single_no_vote_aborts() {
        let (tm, fakes) = manager(3);
        fakes[1].script(Reply::No, true);

        let err = tm
            .write(Kind::Insert, "a".into(), Some("1".into()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::VoteRejected {
                id: 1,
                rejected: 1,
                voters: 3
            }
        );
        for f in &fakes {
            assert_eq!(f.commits(), 0);
            assert_eq!(f.value("a"), None);
        }
        assert_eq!(tm.replicas().len(), 3);
        assert_eq!(fakes[1].state.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_vote_with_live_probe_keeps_member() {
        let (tm, fakes) = manager(2);
        fakes[0].script(Reply::Fail, true);

        assert!(!tm.put("a".into(), "1".into()).await);
        assert_eq!(fakes[0].state.probes.load(Ordering::SeqCst), 1);
        assert_eq!(tm.replicas().addrs(), vec!["r1", "r2"]);
        assert_eq!(fakes[1].commits(), 0);
    }

    #[tokio::test]
    async fn test_dead_replica_pruned() {
        let (tm, fakes) = manager(3);
        assert!(tm.put("a".into(), "1".into()).await);

        fakes[1].script(Reply::Fail, false);
        assert!(!tm.del("a".into()).await);
        assert_eq!(tm.replicas().addrs(), vec!["r1", "r3"]);
        for f in &fakes {
            assert_eq!(f.value("a"), Some("1".to_owned()));
        }

        assert!(tm.put("b".into(), "2".into()).await);
        assert_eq!(fakes[1].votes(), 2);
        assert_eq!(fakes[1].value("b"), None);
        for f in [&fakes[0], &fakes[2]].iter() {
            assert_eq!(f.votes(), 3);
            assert_eq!(f.value("b"), Some("2".to_owned()));
        }
    }

    #[tokio::test]
    async fn test_hung_vote_times_out() {
        let (tm, fakes) = manager(2);
        fakes[0].script(Reply::Hang, false);

        let started = time::Instant::now();
        assert!(!tm.put("a".into(), "1".into()).await);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(tm.replicas().addrs(), vec!["r2"]);
    }

    #[tokio::test]
    async fn test_commit_failure_is_ignored() {
        let (tm, fakes) = manager(2);
        fakes[0].state.commit_ok.store(false, Ordering::SeqCst);

        assert!(tm.put("a".into(), "1".into()).await);
        assert_eq!(fakes[0].commits(), 1);
        assert_eq!(fakes[1].value("a"), Some("1".to_owned()));
        assert_eq!(tm.replicas().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_membership() {
        let (tm, _) = manager(0);
        assert!(!tm.put("a".into(), "1".into()).await);
        assert!(!tm.del("a".into()).await);
        assert_eq!(tm.get("a".into()).await, "");
        assert_eq!(tm.try_get("a").await.unwrap_err(), Error::NoReplicasAvailable);

        let tm = TransactionManager::<Fake>::new(Config {
            commit_without_replicas: true,
            ..config()
        });
        assert!(tm.put("a".into(), "1".into()).await);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let (tm, fakes) = manager(1);
        assert!(!tm.put(String::new(), "1".into()).await);
        assert_eq!(tm.get(String::new()).await, "");
        assert_eq!(fakes[0].votes(), 0);
        assert_eq!(fakes[0].state.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_read_is_not_pruned() {
        let (tm, fakes) = manager(1);
        assert!(tm.put("a".into(), "1".into()).await);
        fakes[0].script(Reply::Fail, false);

        assert_eq!(tm.get("a".into()).await, "");
        assert_eq!(fakes[0].state.probes.load(Ordering::SeqCst), 0);
        assert_eq!(tm.replicas().len(), 1);
    }

    #[tokio::test]
    async fn test_ids_increase_per_transaction() {
        let (tm, fakes) = manager(1);
        fakes[0].script(Reply::No, true);
        assert!(!tm.put("a".into(), "1".into()).await);
        fakes[0].script(Reply::Yes, true);
        let tx = tm.write(Kind::Delete, "a".into(), None).await.unwrap();
        assert_eq!(tx.id(), 2);
        assert_eq!(*fakes[0].state.votes.lock(), vec![1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts() {
        const N: usize = 20;
        let (tm, fakes) = manager(3);
        let tm = Arc::new(tm);

        let writers: Vec<_> = (0..N)
            .map(|i| {
                let tm = tm.clone();
                tokio::spawn(
                    async move { tm.put(format!("key-{}", i), format!("value-{}", i)).await },
                )
            })
            .collect();
        for w in writers {
            assert!(w.await.unwrap());
        }

        for f in &fakes {
            assert_eq!(f.state.store.len(), N);
            let mut ids = f.state.votes.lock().clone();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), N);
        }
    }
}
