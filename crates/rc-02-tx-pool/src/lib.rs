//! # Rollup L2 Transaction Pool
//!
//! Holds L2 transactions awaiting inclusion in the next batch, keeps linked
//! transactions together as atomic groups, and composes the ordered list
//! of transactions handed to the batch builder.
//!
//! ## Lifecycle
//!
//! ```text
//! [PENDING] ──select──→ [FORGING] ──done──→ [FORGED]
//!     │  ↑                  │                   │
//!     │  └───── reorg ──────┴────── reorg ──────┘
//!     │
//!     └── invalidate / stale nonce ──→ [INVALID]
//! ```
//!
//! Forged and Invalid rows stay for `safety_period` batches, then `purge`
//! deletes them. Pending rows older than the TTL are evicted oldest first
//! while the pool is above `max_txs`.
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | No duplicate ids | `domain/pool.rs` - `plan_add()` |
//! | `batch_num` present iff Forged | `domain/pool.rs` - `transitioned()` |
//! | Atomic groups transition whole | `domain/pool.rs` - `lifecycle_rows()`, `group_closure()` |
//! | Per-account nonces increase within a batch | `domain/selection.rs` - cursor walk |
//! | Failed store commit leaves memory untouched | `service.rs` - `commit()` |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  service.rs / tasks.rs - TxPoolService, purge & gossip loops    │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - in-memory store, Ed25519 verifier, account         │
//! │              snapshot, gossip publishers, manual clock          │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - TxPoolApi trait                            │
//! │  ports/outbound.rs - AccountProvider, TxStore,                  │
//! │                      SignatureVerifier, GossipPublisher,        │
//! │                      TimeSource                                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/entities.rs     - PoolL2Tx, PoolTxState, TxType         │
//! │  domain/pool.rs         - PoolStore, plan/apply                 │
//! │  domain/atomic.rs       - AtomicGroupRegistry, validation       │
//! │  domain/selection.rs    - SelectionEngine                       │
//! │  domain/value_objects.rs - Changeset, SelectionOutcome          │
//! │  domain/errors.rs       - PoolError, StoreError                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod service;
pub mod tasks;

pub use adapters::*;
pub use config::{ConfigError, PoolConfig};
pub use domain::*;
pub use ports::*;
pub use service::{PoolDependencies, TxPoolService};
pub use tasks::{
    gossip_ingest_task, purge_task, spawn_gossip_ingest, spawn_purge_task, IngestStats,
};
