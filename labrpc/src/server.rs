use crate::network::NetworkPackage;
use tokio::sync::mpsc::Sender;

/// Server half of a service generated by [`service!`](crate::service).
#[async_trait::async_trait]
pub trait Server: Send + Sized + 'static {
    type Service;
    fn from_service(svc: Self::Service) -> Self;
    /// Channel the router delivers this node's requests on.
    fn client_chan(&self) -> Sender<NetworkPackage>;
    /// Take the next request and dispatch it on its own task. `false` once
    /// the channel is closed.
    async fn handle(&mut self) -> bool;
    async fn run(mut self) {
        while self.handle().await {}
    }
}
