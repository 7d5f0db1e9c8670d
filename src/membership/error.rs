use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum MembershipError {
    /// The backing store failed or could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Suspicion evidence read back with mismatched lengths. Never repaired.
    #[error(
        "suspecting_silos has {silos} element(s) but suspecting_times has {times}; membership row for '{entity_id}' is inconsistent"
    )]
    Inconsistent {
        entity_id: String,
        silos: usize,
        times: usize,
    },

    #[error("membership row '{entity_id}' has a malformed column '{column}': {reason}")]
    MalformedRow {
        entity_id: String,
        column: String,
        reason: String,
    },

    /// A write that must not create rows targeted a silo that has none.
    #[error("no membership row for '{0}'")]
    RowNotFound(String),

    #[error("cluster '{0}' has no version row")]
    MissingVersion(String),

    #[error("invalid silo address '{0}'")]
    InvalidSiloAddress(String),

    #[error("operation '{0}' is not supported by this membership table")]
    NotSupported(&'static str),

    #[error("membership table is not initialized")]
    NotInitialized,
}
