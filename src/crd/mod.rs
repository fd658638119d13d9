//! Custom Resource Definitions for the Aura operator

mod aura_instance;
mod types;

pub use aura_instance::{AuraInstance, AuraInstanceSpec, AuraInstanceStatus};
pub use types::*;
