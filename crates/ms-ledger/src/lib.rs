//! # ms-ledger
//!
//! The local source of truth for msync: every qualifying early-morning
//! meditation that has ever been detected, keyed by a deterministic identity.
//!
//! ## Key components
//!
//! - [`MeditationRecord`] — one qualifying session and its remote correlation
//! - [`LedgerStore`] — JSON file persistence with atomic saves and
//!   idempotent merge
//! - [`LedgerLock`] — exclusive advisory lock held by mutating commands

pub mod error;
pub mod lock;
pub mod record;
pub mod store;

pub use error::LedgerError;
pub use lock::LedgerLock;
pub use record::{is_valid_identity, MeditationRecord};
pub use store::LedgerStore;
