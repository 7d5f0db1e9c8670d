use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::Consistency;

/// Failures reported by a backing store, local or remote.
///
/// The type is serializable so a store node can hand it back to remote clients verbatim.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum StoreError {
    #[error("not enough replicas for {consistency:?}: required {required}, alive {alive}")]
    Unavailable {
        consistency: Consistency,
        required: usize,
        alive: usize,
    },

    #[error("keyspace '{0}' does not exist")]
    KeyspaceNotFound(String),

    #[error("table '{keyspace}.{table}' does not exist")]
    TableNotFound { keyspace: String, table: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("no contact point reachable: {0}")]
    NoHostAvailable(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// True for failures a caller may retry against another host.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. }
                | StoreError::NoHostAvailable(_)
                | StoreError::Transport(_)
        )
    }
}
