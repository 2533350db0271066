//! # Shared Types Crate
//!
//! Primitive types shared by every crate of the rollup coordinator's
//! transaction-admission layer.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: identifiers and fixed-width protocol fields
//!   are defined once here.
//! - **Newtypes for identities**: `Idx`, `TxId` and `AtomicGroupId` are
//!   distinct types so they cannot be mixed up at call sites.

pub mod entities;

pub use entities::*;
