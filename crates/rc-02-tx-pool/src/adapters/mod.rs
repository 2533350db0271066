//! Adapters implementing the outbound ports.

pub mod accounts;
pub mod publisher;
pub mod store;
pub mod time;
pub mod verifier;

pub use accounts::StaticAccountProvider;
pub use publisher::{ChannelPublisher, NoOpPublisher};
pub use store::InMemoryTxStore;
pub use time::ManualTimeSource;
pub use verifier::Ed25519SignatureVerifier;
