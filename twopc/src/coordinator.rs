use std::sync::Arc;

use labrpc::{anyhow::Result, NetworkHandle};

use crate::{CoordinatorService, ReplicaClient, TransactionManager};

/// Client-facing service: forwards every call to the transaction manager
/// and turns replica registrations into endpoints on the network.
pub struct Coordinator {
    tm: Arc<TransactionManager<ReplicaClient>>,
    net: NetworkHandle,
}

impl Coordinator {
    /// Serve `tm`, resolving replica addresses on `net`.
    pub fn new(tm: Arc<TransactionManager<ReplicaClient>>, net: NetworkHandle) -> Self {
        Self { tm, net }
    }

    /// The manager behind this service.
    pub fn manager(&self) -> &Arc<TransactionManager<ReplicaClient>> {
        &self.tm
    }
}

#[labrpc::async_trait]
impl CoordinatorService for Coordinator {
    async fn put(&self, key: String, value: String) -> Result<bool> {
        Ok(self.tm.put(key, value).await)
    }

    async fn del(&self, key: String) -> Result<bool> {
        Ok(self.tm.del(key).await)
    }

    async fn get(&self, key: String) -> Result<String> {
        Ok(self.tm.get(key).await)
    }

    async fn register_replica(&self, addr: String) -> Result<()> {
        self.tm.add_replica(self.net.client(addr));
        Ok(())
    }
}
