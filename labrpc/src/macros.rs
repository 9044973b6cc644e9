#[macro_export]
macro_rules! service {
    () => {
        compile_error!("empty service is not allowed");
    };
    (
        $(#[$service_attr:meta])*
        service $svc_name:ident {
            $(
                $(#[$method_attr:meta])*
                fn $method_name:ident($($arg_id:ident: $arg_ty:ty),*) -> $output:ty;
            )*
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$service_attr])*
        pub mod $svc_name {
            use super::*;

            use $crate::network::NetworkPackage;
            use $crate::{server, client};

            use std::sync::Arc;
            use std::time::Duration;

            use $crate::tokio::sync::{mpsc::{self, Sender, Receiver}, oneshot};
            use $crate::serde_json;
            use $crate::serde::{Serialize, Deserialize};
            use $crate::anyhow::{Result, anyhow};
            use $crate::async_trait;
            use $crate::log::{error, trace};


            #[derive(Debug, Deserialize, Serialize)]
            pub enum Request {
                $(
                    #[allow(non_camel_case_types)]
                    $method_name {  $($arg_id : $arg_ty),* }
                ),*
            }

            mod response {
                use super::*;
                $(
                    #[derive(Deserialize, Serialize)]
                    #[allow(non_camel_case_types)]
                    pub struct $method_name {
                        pub data: $output
                    }
                )*
            }

            #[async_trait]
            pub trait Service: Send + Sync + 'static {
                $(
                    $(#[$method_attr])*
                    async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output>;
                )*
            }

            #[derive(Debug, Clone)]
            pub struct Client {
                server_id: String,
                tx: Sender<NetworkPackage>,
                timeout: Option<Duration>,
            }

            impl Client {
                /// Fail every call that has not been answered within `timeout`.
                pub fn with_timeout(mut self, timeout: Duration) -> Self {
                    self.timeout = Some(timeout);
                    self
                }

                $(
                    pub async fn $method_name(&self, $($arg_id : $arg_ty),* ) -> Result<$output> {
                        let req = Request::$method_name {
                            $($arg_id),*
                        };
                        let resp = self.call(serde_json::to_string(&req)?).await?;
                        let resp: response::$method_name = serde_json::from_str(&resp)?;
                        Ok(resp.data)
                    }
                )*

                pub async fn call(&self, req: String) -> Result<String> {
                    let (reply, rx) = oneshot::channel();
                    self.tx
                        .send(NetworkPackage { to: self.server_id.clone(), reply, data: req.clone() })
                        .await
                        .map_err(|_| anyhow!("network is down"))?;
                    let resp = match self.timeout {
                        Some(t) => $crate::tokio::time::timeout(t, rx)
                            .await
                            .map_err(|_| anyhow!("call to {} timed out after {:?}", self.server_id, t))?,
                        None => rx.await,
                    };
                    match resp {
                        Ok(resp) => {
                            trace!("req: {}, resp: {}", req, &resp);
                            Ok(resp)
                        }
                        Err(_) => Err(anyhow!("unable to receive from {}", self.server_id)),
                    }
                }
            }

            impl client::Client for Client {
                fn from_server(server_id: String, net_tx: Sender<NetworkPackage>) -> Self {
                    Self {
                        server_id,
                        tx: net_tx,
                        timeout: None,
                    }
                }

                fn server_id(&self) -> &str {
                    &self.server_id
                }
            }

            async fn dispatch<T: Service>(svc: &T, data: &str) -> Result<String> {
                let req: Request = serde_json::from_str(data)?;
                match req {
                    $(
                        Request::$method_name { $($arg_id),* } => {
                            let data = svc.$method_name($($arg_id),* ).await?;
                            Ok(serde_json::to_string(&response::$method_name { data })?)
                        }
                    )*
                }
            }

            pub struct Server<T: Service> {
                svc: Arc<T>,
                tx: Sender<NetworkPackage>,
                rx: Receiver<NetworkPackage>,
            }

            #[async_trait]
            impl<T: Service> server::Server for Server<T> {
                type Service = T;

                fn from_service(svc: Self::Service) -> Self {
                    let (tx, rx) = mpsc::channel(100);
                    Self { svc: Arc::new(svc), tx, rx }
                }

                fn client_chan(&self) -> Sender<NetworkPackage> {
                    self.tx.clone()
                }

                async fn handle(&mut self) -> bool {
                    let NetworkPackage { to, reply, data } = match self.rx.recv().await {
                        Some(p) => p,
                        None => return false,
                    };
                    trace!("handle recv: {}", &data);
                    let svc = self.svc.clone();
                    $crate::tokio::spawn(async move {
                        match dispatch(&*svc, &data).await {
                            Ok(resp) => {
                                trace!("handle send: {}", &resp);
                                if reply.send(resp).is_err() {
                                    trace!("caller of {} went away", to);
                                }
                            }
                            // Dropping `reply` surfaces the failure to the caller.
                            Err(e) => error!("{} failed to serve {}: {}", to, data, e),
                        }
                    });
                    true
                }
            }
        }
    };
}
