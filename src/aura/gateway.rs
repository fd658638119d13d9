//! Typed contract over the remote instance API
//!
//! Implementations map HTTP status codes onto outcomes:
//! `get` answers `Ok(None)` for 404, `create`/`patch` succeed only on 202,
//! and any other code becomes [`Error::UpstreamRejected`](crate::Error::UpstreamRejected).

use std::time::Duration;

use async_trait::async_trait;

use super::token::ClientCredentials;
use super::types::{
    CreateInstanceRequest, CreatedInstance, InstanceData, InstanceSummary, PatchInstanceRequest,
};
use crate::error::Result;

#[async_trait]
pub trait InstanceGateway: Send + Sync {
    /// List instances visible to the credentials, filtered by tenant
    async fn list_instances(&self, tenant_id: &str) -> Result<Vec<InstanceSummary>>;

    /// Fetch one instance; `None` when the API answers 404
    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceData>>;

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<CreatedInstance>;

    async fn patch_instance(&self, instance_id: &str, request: &PatchInstanceRequest)
        -> Result<()>;
}

/// Builds an authenticated gateway for one set of client credentials
pub trait GatewayFactory: Send + Sync {
    fn gateway(
        &self,
        credentials: ClientCredentials,
        timeout: Duration,
    ) -> Result<Box<dyn InstanceGateway>>;
}
