//! Cluster Membership Directory Library
//!
//! Persists the membership of a distributed actor runtime (which silos exist, where they
//! listen, who suspects whom) in a quorum-replicated column store, and offers the
//! gateway discovery view clients use to find entry points into the cluster.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`config`**: Options passed explicitly into every component; loadable from TOML.
//! - **`membership`**: The membership table protocol (optimistic versioning over atomic
//!   batches), the row codec and the gateway list provider.
//! - **`storage`**: The replicated wide-column store: schema, replication, last-write-wins
//!   reconciliation, conditional batches, plus its HTTP node and client.

pub mod config;
pub mod membership;
pub mod storage;
