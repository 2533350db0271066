//! Domain layer for the transaction pool.
//!
//! Pure logic: no I/O, no locking, no logging.

pub mod atomic;
pub mod entities;
pub mod errors;
pub mod pool;
pub mod selection;
pub mod value_objects;

pub use atomic::{AtomicGroup, AtomicGroupRegistry, GroupStatus};
pub use entities::*;
pub use errors::{ErrorKind, PoolError, StoreError};
pub use pool::{AdmissionPlan, PoolStore};
pub use selection::SelectionEngine;
pub use value_objects::*;
