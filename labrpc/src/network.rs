use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use futures::Future;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::sync::{
    mpsc::{self, Receiver, Sender},
    oneshot,
};

use crate::{client::Client, server::Server};

#[derive(Debug)]
pub struct NetworkPackage {
    pub to: String,
    pub reply: oneshot::Sender<String>,
    pub data: String,
}

/// Per-node link conditions applied by the router.
#[derive(Debug, Default)]
struct Links {
    disconnected: HashSet<String>,
    delays: HashMap<String, Duration>,
}

type Nodes = Arc<Mutex<HashMap<String, Sender<NetworkPackage>>>>;

pub struct Network {
    tx: Sender<NetworkPackage>,
    rx: Receiver<NetworkPackage>,
    nodes: Nodes,
    links: Arc<Mutex<Links>>,
}

/// Cloneable control plane of a running [`Network`].
#[derive(Clone)]
pub struct NetworkHandle {
    tx: Sender<NetworkPackage>,
    nodes: Nodes,
    links: Arc<Mutex<Links>>,
}

impl Network {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(100);
        Self {
            tx,
            rx,
            nodes: Arc::new(Mutex::new(HashMap::default())),
            links: Arc::new(Mutex::new(Links::default())),
        }
    }

    pub fn handle(&self) -> NetworkHandle {
        NetworkHandle {
            tx: self.tx.clone(),
            nodes: self.nodes.clone(),
            links: self.links.clone(),
        }
    }

    /// Attach `svc` to the network under `id`.
    ///
    /// The node is routable as soon as this returns; the returned future
    /// serves requests and must be spawned.
    pub fn register_service<S, C, V>(&self, id: String, svc: V) -> (C, impl Future<Output = ()>)
    where
        S: Server<Service = V>,
        C: Client,
    {
        self.handle().register_service::<S, C, V>(id, svc)
    }

    pub async fn run(mut self) {
        while let Some(p) = self.rx.recv().await {
            let delay = {
                let links = self.links.lock();
                if links.disconnected.contains(&p.to) {
                    trace!("{} is disconnected, dropped", p.to);
                    continue;
                }
                links.delays.get(&p.to).copied()
            };
            let node = self.nodes.lock().get(&p.to).cloned();

            match node {
                Some(node) => {
                    tokio::spawn(async move {
                        if let Some(d) = delay {
                            tokio::time::sleep(d).await;
                        }
                        if node.send(p).await.is_err() {
                            warn!("send to node failed, dropped");
                        }
                    });
                }
                None => warn!("node {} not found", p.to),
            }
        }
    }
}

impl Default for Network {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkHandle {
    /// See [`Network::register_service`]. Usable after the router is running.
    pub fn register_service<S, C, V>(&self, id: String, svc: V) -> (C, impl Future<Output = ()>)
    where
        S: Server<Service = V>,
        C: Client,
    {
        let client = C::from_server(id.clone(), self.tx.clone());
        let server = S::from_service(svc);
        self.nodes.lock().insert(id.clone(), server.client_chan());
        info!("node {} registered", id);
        (client, async move {
            server.run().await;
            debug!("node {} stopped", id);
        })
    }

    /// Build a client for the node registered (now or later) as `id`.
    pub fn client<C: Client>(&self, id: impl Into<String>) -> C {
        C::from_server(id.into(), self.tx.clone())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.nodes.lock().contains_key(id)
    }

    /// Drop every request addressed to `id` until [`connect`](Self::connect).
    pub fn disconnect(&self, id: &str) {
        info!("disconnect {}", id);
        self.links.lock().disconnected.insert(id.to_owned());
    }

    pub fn connect(&self, id: &str) {
        info!("connect {}", id);
        self.links.lock().disconnected.remove(id);
    }

    /// Hold every request addressed to `id` for `delay` before delivery.
    pub fn set_delay(&self, id: &str, delay: Option<Duration>) {
        let mut links = self.links.lock();
        match delay {
            Some(d) => links.delays.insert(id.to_owned(), d),
            None => links.delays.remove(id),
        };
    }
}
