//! Ports layer for the transaction pool.
//!
//! - Inbound (driving) port: the API exposed to the batch builder and the
//!   operational surface
//! - Outbound (driven) ports: account snapshot, persistent store, signature
//!   check, gossip, clock

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
