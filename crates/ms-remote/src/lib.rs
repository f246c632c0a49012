//! # ms-remote
//!
//! Everything msync knows about the tracking service.
//!
//! The sync engine only sees two traits: [`RemoteGoalClient`] (CRUD on the
//! datapoints of the goal being kept in sync) and [`DetectionSource`] (the
//! raw sessions of the goal being scanned). [`BeeminderClient`] implements
//! both over HTTP; [`InMemoryGoalService`] implements both in process.
//!
//! Remote calls are wrapped in a [`RetryPolicy`], which retries only errors
//! that [`RemoteError::is_transient`] classifies as worth another attempt.

pub mod beeminder;
pub mod client;
pub mod datapoint;
pub mod error;
pub mod memory;
pub mod retry;

pub use beeminder::BeeminderClient;
pub use client::{DetectionSource, RemoteGoalClient};
pub use datapoint::{RawEvent, RemoteDatapoint};
pub use error::RemoteError;
pub use memory::{FailurePoint, InMemoryGoalService};
pub use retry::RetryPolicy;
