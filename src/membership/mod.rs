//! Membership & Discovery Module
//!
//! Records which silos of a cluster exist, their endpoints and their suspicion state, in
//! a replicated store accessed at each-quorum consistency.
//!
//! ## Core Mechanisms
//! - **Optimistic Versioning**: A single version row per cluster. Every insert/update writes
//!   the silo row and `expected + 1` into that row in one atomic batch, conditional on the
//!   stored version still being `expected`.
//! - **Heartbeats**: `update_i_am_alive` touches only the liveness column; it never bumps the
//!   version.
//! - **Discovery**: `GatewayListProvider` projects active silos with a proxy port into
//!   `gwy.tcp://` URIs. Refresh cadence is left to the caller.

pub mod codec;
pub mod error;
pub mod gateway;
pub mod store;
pub mod table;
pub mod types;

pub use error::MembershipError;
pub use gateway::GatewayListProvider;
pub use table::MembershipTable;

#[cfg(test)]
mod tests;
