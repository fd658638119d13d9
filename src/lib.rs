//! Neo4j Aura operator
//!
//! Reconciles `AuraInstance` resources against the Neo4j Aura API: creates
//! or adopts remote instances, publishes their connection details as a
//! Secret and keeps memory and plugin settings in sync.

pub mod aura;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
