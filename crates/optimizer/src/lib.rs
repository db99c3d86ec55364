//! Optimizer client abstraction and implementations.
//!
//! This crate provides the trait an agent uses to take part in
//! evolutionary optimization, an in-process reference service and an
//! HTTP client for a remote one.

#![warn(missing_docs)]

pub mod trait_;
pub mod memory;
pub mod http;

pub use trait_::{OptimizerClient, OptimizerError, PopulateRequest, Result};
pub use memory::{Bounds, InMemoryOptimizer, MemoryOptimizerConfig};
pub use http::HttpOptimizerClient;
