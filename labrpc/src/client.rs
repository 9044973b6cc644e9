use tokio::sync::mpsc::Sender;

use crate::network::NetworkPackage;

/// Client half of a service generated by [`service!`](crate::service).
pub trait Client {
    /// Client of the node `server_id`, sending through the router at `net_tx`.
    fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self;
    fn server_id(&self) -> &str;
}
