use labrpc::{anyhow::Result, log::warn};
use twopc::CoordinatorClient;

/// Client for a KV cluster
#[derive(Clone)]
pub struct Client {
    coordinator: CoordinatorClient,
}

impl Client {
    /// Create a new client talking to `coordinator`.
    pub fn new(coordinator: CoordinatorClient) -> Self {
        Self { coordinator }
    }

    /// Store `value` under `key`. `Ok(false)` means the transaction aborted.
    pub async fn put(&self, key: &str, value: &str) -> Result<bool> {
        self.coordinator
            .put(key.to_owned(), value.to_owned())
            .await
    }

    /// Delete `key`. `Ok(false)` means the transaction aborted.
    pub async fn del(&self, key: &str) -> Result<bool> {
        self.coordinator.del(key.to_owned()).await
    }

    /// Value of `key`, empty on a miss or a failed read.
    pub async fn get(&self, key: &str) -> Result<String> {
        self.coordinator.get(key.to_owned()).await
    }

    /// [`put`](Self::put), resubmitted as a new transaction up to `attempts`
    /// times while it aborts.
    pub async fn put_retry(&self, key: &str, value: &str, attempts: usize) -> Result<bool> {
        for attempt in 1..=attempts {
            if self.put(key, value).await? {
                return Ok(true);
            }
            warn!("put {} did not go through (attempt {}/{})", key, attempt, attempts);
        }
        Ok(false)
    }

    /// [`del`](Self::del), resubmitted as a new transaction up to `attempts`
    /// times while it aborts.
    pub async fn del_retry(&self, key: &str, attempts: usize) -> Result<bool> {
        for attempt in 1..=attempts {
            if self.del(key).await? {
                return Ok(true);
            }
            warn!("del {} did not go through (attempt {}/{})", key, attempt, attempts);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labrpc::tokio;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tempfile::TempDir;
    use twopc::{cluster, Config, Participant, Transaction};

    use crate::RocksStore;

    /// Participant that votes no on the first `n` transactions it sees.
    fn reluctant(store: Arc<RocksStore>, n: usize) -> Participant<RocksStore> {
        let seen = AtomicUsize::new(0);
        Participant::with_policy(store, move |_: &Transaction| {
            seen.fetch_add(1, Ordering::SeqCst) >= n
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_set_and_get() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let participants = (0..3)
            .map(|i| {
                let store = RocksStore::new(dir.path().join(format!("kv-{}", i))).unwrap();
                Participant::new(Arc::new(store))
            })
            .collect();
        let c = cluster::start(Config::default(), participants).await.unwrap();
        let client = Client::new(c.coordinator.clone());

        assert!(client.put("key-1", "value-1").await.unwrap());
        assert_eq!(client.get("key-1").await.unwrap(), "value-1");
        assert!(client.del("key-1").await.unwrap());
        assert_eq!(client.get("key-1").await.unwrap(), "");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_retry_resubmits() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::new(dir.path().join("kv-0")).unwrap());
        let c = cluster::start(Config::default(), vec![reluctant(store, 2)])
            .await
            .unwrap();
        let client = Client::new(c.coordinator.clone());

        assert!(!client.put_retry("a", "1", 1).await.unwrap());
        assert!(client.put_retry("a", "1", 3).await.unwrap());
        assert_eq!(client.get("a").await.unwrap(), "1");
        assert!(client.del_retry("a", 1).await.unwrap());
    }
}
