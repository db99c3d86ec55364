//! Trial control loop.
//!
//! Ties an agent to an optimizer: periodic re-evaluation, score
//! submission, parameter population and the failure / success / draw /
//! reset events raised by the environment.

#![warn(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod runner;
pub mod strategy;

pub use config::{ExhaustionPolicy, SyncMode, TrialConfig};
pub use controller::{
    Conclusion, DrawOutcome, Population, Succession, TickOutcome, TrialBuilder, TrialController,
    TrialStats,
};
pub use error::{Result, TrialError};
pub use runner::{SharedController, TrialEvent, TrialNotice, TrialRunner};
pub use strategy::{CachedBatch, LiveSync, SyncStrategy};
