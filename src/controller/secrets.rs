//! Namespaced Secret access used by the reconciliation engine

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, PostParams, Preconditions};
use kube::Client;
use tracing::info;

use crate::error::{Error, Result};

/// Read/create/delete Secrets in the namespace of the record being reconciled
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Secret>>;

    async fn create(&self, secret: &Secret) -> Result<()>;

    /// Delete a Secret; when `uid` is given the deletion only applies to that exact object
    async fn delete(&self, name: &str, uid: Option<&str>) -> Result<()>;
}

pub struct KubeSecretStore {
    api: Api<Secret>,
}

impl KubeSecretStore {
    pub fn namespaced(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, name: &str) -> Result<Option<Secret>> {
        self.api.get_opt(name).await.map_err(Error::KubeError)
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        self.api
            .create(&PostParams::default(), secret)
            .await
            .map_err(Error::KubeError)?;
        Ok(())
    }

    async fn delete(&self, name: &str, uid: Option<&str>) -> Result<()> {
        let params = DeleteParams {
            preconditions: uid.map(|uid| Preconditions {
                uid: Some(uid.to_string()),
                resource_version: None,
            }),
            ..Default::default()
        };

        match self.api.delete(name, &params).await {
            Ok(_) => info!("Deleted Secret {}", name),
            Err(kube::Error::Api(e)) if e.code == 404 => {}
            Err(e) => return Err(Error::KubeError(e)),
        }
        Ok(())
    }
}
