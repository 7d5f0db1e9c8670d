//! Replicated Column Store Module
//!
//! Implements the quorum-consistent wide-column store the membership table is persisted in.
//!
//! ## Core Concepts
//! - **Schema**: Tables are described by an explicit `TableSchema` (columns + partition key);
//!   every write is validated against it.
//! - **Replication**: Each keyspace holds `replication_factor` replicas. Writes reach every
//!   available replica and need as many acknowledgements as the consistency level demands.
//! - **Reconciliation**: Cells carry write timestamps; reads merge replicas last-write-wins
//!   and repair the stale copies they touched.
//! - **Batches**: A batch is applied atomically and may carry conditions (existence or
//!   column equality) that are checked under the same table lock.
//! - **Access**: `QuorumStore` is the seam. `ColumnStore` runs in-process, `StoreNode`
//!   serves it over HTTP and `RemoteStore` is the matching client.

pub mod backend;
pub mod client;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod node;
pub mod protocol;
pub mod replication;
pub mod types;

pub use backend::QuorumStore;
pub use engine::ColumnStore;
pub use error::StoreError;
