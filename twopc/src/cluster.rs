use std::sync::Arc;

use labrpc::{anyhow::Result, tokio, tokio::task::JoinHandle, Network, NetworkHandle};

use crate::{
    replica, Config, Coordinator, CoordinatorClient, CoordinatorServer, LocalStore, MemStore,
    Participant, ReplicaClient, ReplicaServer, TransactionManager,
};

/// Network id of the coordinator.
pub const COORDINATOR_ID: &str = "coordinator";

/// Network id of the `i`-th replica.
pub fn replica_id(i: usize) -> String {
    format!("replica-{}", i)
}

/// A coordinator and its replicas running on one simulated network.
pub struct Cluster<S> {
    /// Client of the coordinator service.
    pub coordinator: CoordinatorClient,
    /// The coordinator's manager, for inspecting membership.
    pub manager: Arc<TransactionManager<ReplicaClient>>,
    /// Store of each replica, by index.
    pub stores: Vec<Arc<S>>,
    /// Fault injection.
    pub net: NetworkHandle,
    tasks: Vec<JoinHandle<()>>,
}

/// Start a coordinator plus one replica per participant, and register every
/// replica with the coordinator.
pub async fn start<S: LocalStore>(
    config: Config,
    participants: Vec<Participant<S>>,
) -> Result<Cluster<S>> {
    let net = Network::new();
    let handle = net.handle();
    let mut tasks = Vec::new();

    let manager = Arc::new(TransactionManager::new(config));
    let (coordinator, server) = net.register_service::<CoordinatorServer<Coordinator>, _, _>(
        COORDINATOR_ID.to_owned(),
        Coordinator::new(manager.clone(), handle.clone()),
    );
    tasks.push(tokio::spawn(server));

    let mut stores = Vec::new();
    let mut ids = Vec::new();
    for (i, p) in participants.into_iter().enumerate() {
        let id = replica_id(i);
        stores.push(p.store().clone());
        let (_, server) = net.register_service::<ReplicaServer<Participant<S>>, ReplicaClient, _>(
            id.clone(),
            p,
        );
        tasks.push(tokio::spawn(server));
        ids.push(id);
    }

    tasks.push(tokio::spawn(net.run()));

    for id in ids.iter() {
        replica::join(&coordinator, id).await?;
    }

    Ok(Cluster {
        coordinator,
        manager,
        stores,
        net: handle,
        tasks,
    })
}

/// [`start`] `n` in-memory replicas that vote yes on everything.
pub async fn start_mem(config: Config, n: usize) -> Result<Cluster<MemStore>> {
    let participants = (0..n)
        .map(|_| Participant::new(Arc::new(MemStore::new())))
        .collect();
    start(config, participants).await
}

impl<S: LocalStore> Cluster<S> {
    /// Make replica `i` unreachable.
    pub fn kill(&self, i: usize) {
        self.net.disconnect(&replica_id(i));
    }

    /// Make replica `i` reachable again. It takes part in transactions only
    /// after it [`rejoin`](Self::rejoin)s.
    pub fn revive(&self, i: usize) {
        self.net.connect(&replica_id(i));
    }

    /// Register replica `i` with the coordinator again.
    pub async fn rejoin(&self, i: usize) -> Result<()> {
        replica::join(&self.coordinator, &replica_id(i)).await
    }

    /// Addresses the coordinator currently counts as members.
    pub fn members(&self) -> Vec<String> {
        self.manager.replicas().addrs()
    }
}

impl<S> Drop for Cluster<S> {
    fn drop(&mut self) {
        for t in self.tasks.iter() {
            t.abort();
        }
    }
}

#[cfg(test)]
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[cfg(test)]
fn value_of<S: LocalStore>(c: &Cluster<S>, i: usize, key: &str) -> Option<String> {
    c.stores[i].get(key).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_put_then_get() {
    init_logger();
    let c = start_mem(Config::default(), 3).await.unwrap();
    assert_eq!(c.members().len(), 3);

    assert!(c.coordinator.put("a".into(), "1".into()).await.unwrap());
    for i in 0..3 {
        assert_eq!(value_of(&c, i, "a"), Some("1".to_owned()));
    }
    assert_eq!(c.coordinator.get("a".into()).await.unwrap(), "1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_del_then_get() {
    init_logger();
    let c = start_mem(Config::default(), 3).await.unwrap();

    assert!(c.coordinator.put("a".into(), "1".into()).await.unwrap());
    assert!(c.coordinator.del("a".into()).await.unwrap());
    assert_eq!(c.coordinator.get("a".into()).await.unwrap(), "");
    for i in 0..3 {
        assert_eq!(value_of(&c, i, "a"), None);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unreachable_replica_is_pruned() {
    init_logger();
    let c = start_mem(Config::default(), 3).await.unwrap();
    assert!(c.coordinator.put("a".into(), "1".into()).await.unwrap());

    c.kill(1);
    assert!(!c.coordinator.del("a".into()).await.unwrap());
    assert_eq!(c.members(), vec![replica_id(0), replica_id(2)]);
    for i in 0..3 {
        assert_eq!(value_of(&c, i, "a"), Some("1".to_owned()));
    }

    c.revive(1);
    assert!(c.coordinator.put("b".into(), "2".into()).await.unwrap());
    assert_eq!(value_of(&c, 0, "b"), Some("2".to_owned()));
    assert_eq!(value_of(&c, 1, "b"), None);
    assert_eq!(value_of(&c, 2, "b"), Some("2".to_owned()));

    c.rejoin(1).await.unwrap();
    assert_eq!(c.members().len(), 3);
    assert!(c.coordinator.put("c".into(), "3".into()).await.unwrap());
    assert_eq!(value_of(&c, 1, "c"), Some("3".to_owned()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rejecting_replica_aborts() {
    init_logger();
    let participants = vec![
        Participant::new(Arc::new(MemStore::new())),
        Participant::with_policy(Arc::new(MemStore::new()), |tx: &crate::Transaction| {
            tx.key() != "contended"
        }),
    ];
    let c = start(Config::default(), participants).await.unwrap();

    assert!(!c.coordinator.put("contended".into(), "x".into()).await.unwrap());
    assert_eq!(value_of(&c, 0, "contended"), None);
    assert_eq!(c.members().len(), 2);

    assert!(c.coordinator.put("free".into(), "y".into()).await.unwrap());
    assert_eq!(value_of(&c, 0, "free"), Some("y".to_owned()));
    assert_eq!(value_of(&c, 1, "free"), Some("y".to_owned()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_replica_times_out() {
    init_logger();
    let config = Config {
        rpc_timeout: std::time::Duration::from_millis(100),
        ..Config::default()
    };
    let c = start_mem(config, 2).await.unwrap();

    c.net
        .set_delay(&replica_id(0), Some(std::time::Duration::from_secs(2)));
    assert!(!c.coordinator.put("a".into(), "1".into()).await.unwrap());
    assert_eq!(c.members(), vec![replica_id(1)]);
    assert_eq!(value_of(&c, 1, "a"), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_empty_cluster() {
    init_logger();
    let c = start_mem(Config::default(), 0).await.unwrap();
    assert!(!c.coordinator.put("a".into(), "1".into()).await.unwrap());
    assert!(!c.coordinator.del("a".into()).await.unwrap());
    assert_eq!(c.coordinator.get("a".into()).await.unwrap(), "");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_registration() {
    init_logger();
    let c = start_mem(Config::default(), 2).await.unwrap();
    c.rejoin(0).await.unwrap();
    assert_eq!(c.members().len(), 3);

    assert!(c.coordinator.put("a".into(), "1".into()).await.unwrap());
    assert_eq!(value_of(&c, 0, "a"), Some("1".to_owned()));

    c.kill(0);
    assert!(!c.coordinator.put("b".into(), "2".into()).await.unwrap());
    assert_eq!(c.members(), vec![replica_id(1)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 20)]
async fn test_concurrent_clients() {
    const N: usize = 30;
    init_logger();
    let c = start_mem(Config::default(), 5).await.unwrap();

    let mut setters = Vec::new();
    for i in 0..N {
        let client = c.coordinator.clone();
        setters.push(tokio::spawn(async move {
            client
                .put(format!("key-{}", i), format!("value-{}", i))
                .await
                .unwrap()
        }));
    }
    for s in setters {
        assert!(s.await.expect("setters should not panic"));
    }

    for i in 0..N {
        assert_eq!(
            c.coordinator.get(format!("key-{}", i)).await.unwrap(),
            format!("value-{}", i)
        );
    }
    for store in c.stores.iter() {
        assert_eq!(store.len(), N);
    }
}
