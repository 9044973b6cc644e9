use thiserror::Error;

/// Why a coordinator operation did not go through.
///
/// None of these cross the client boundary: writes collapse to `false`,
/// reads to an empty string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A call to a replica did not complete.
    #[error("rpc to replica {addr} failed: {reason}")]
    Transport {
        /// Replica address.
        addr: String,
        /// Transport-level cause.
        reason: String,
    },

    /// Membership is empty.
    #[error("no replicas available")]
    NoReplicasAvailable,

    /// At least one replica did not vote yes.
    #[error("transaction {id} rejected by {rejected} of {voters} replicas")]
    VoteRejected {
        /// Transaction id.
        id: u64,
        /// Replicas that voted no or could not be reached.
        rejected: usize,
        /// Replicas asked.
        voters: usize,
    },

    /// The replica's local store failed.
    #[error("local store failure: {0}")]
    Store(String),

    /// Keys must be non-empty.
    #[error("key must not be empty")]
    EmptyKey,
}

/// Result with [`Error`] as the default error.
pub type Result<T, E = Error> = std::result::Result<T, E>;
