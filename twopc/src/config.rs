use serde::Deserialize;
use std::time::Duration;

/// Coordinator settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bound on every get/vote/probe/commit call to a replica. A call that
    /// runs past it counts as a transport failure.
    pub rpc_timeout: Duration,
    /// Outcome of a write when membership is empty: commit vacuously when
    /// `true`, abort when `false`.
    pub commit_without_replicas: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_millis(500),
            commit_without_replicas: false,
        }
    }
}
