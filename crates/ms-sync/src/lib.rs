//! # ms-sync
//!
//! The sync engine: detect qualifying early-morning meditations on a source
//! goal, record them in the local ledger, and make the tracking goal's
//! datapoints match the ledger exactly.
//!
//! ## Key components
//!
//! - [`QualificationRule`] — the time-window and duration rule, and the
//!   deterministic identity of each qualifying session
//! - [`reconcile()`] — diff ledger against remote into an ordered [`Plan`]
//! - [`apply()`] — execute a plan with per-operation retry and failure capture
//! - [`SyncOrchestrator`] — one full pass, qualify → merge → save → reconcile
//! - [`SyncConfig`] — `msync.toml` plus environment overrides

pub mod apple_health;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod qualify;
pub mod reconcile;

pub use config::SyncConfig;
pub use error::{ConfigError, QualifyError, SyncError};
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncSettings};
pub use qualify::{derive_identity, QualificationRule};
pub use reconcile::{apply, reconcile, ApplyFailure, ApplyReport, Operation, Plan};
