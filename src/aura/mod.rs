//! Neo4j Aura API access
//!
//! The gateway trait is what the reconciliation engine talks to; the HTTP
//! client, token source and wire types live underneath it.

mod client;
mod gateway;
mod token;
pub mod types;

pub use client::{AuraClient, AuraClientFactory};
pub use gateway::{GatewayFactory, InstanceGateway};
pub use token::{ClientCredentials, TokenSource};
pub use types::{
    CreateInstanceRequest, CreatedInstance, InstanceData, InstanceState, InstanceSummary,
    PatchInstanceRequest,
};
