//! Cross-crate integration scenarios.

pub mod admission;
pub mod concurrency;
pub mod gossip;
pub mod lifecycle;
