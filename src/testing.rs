//! In-memory stand-ins for the Kubernetes Secret API and the Aura API
//!
//! Used by unit tests and, behind the `testing` feature, by the property
//! tests under `tests/`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::error::ErrorResponse;

use crate::aura::{
    ClientCredentials, CreateInstanceRequest, CreatedInstance, GatewayFactory, InstanceData,
    InstanceGateway, InstanceSummary, PatchInstanceRequest,
};
use crate::controller::SecretStore;
use crate::crd::{
    AuraInstance, AuraInstanceSpec, AuraInstanceTier, CloudProvider, SecretReference,
};
use crate::error::{Error, Result};

fn api_error(code: u16, reason: &str, message: &str) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: reason.to_string(),
        code,
    }))
}

/// AuraInstance `name` in namespace `default` with uid `uid-<name>`
pub fn aura_instance(name: &str) -> AuraInstance {
    AuraInstance {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("uid-{name}")),
            generation: Some(1),
            resource_version: Some("1".to_string()),
            ..Default::default()
        },
        spec: AuraInstanceSpec {
            tier: AuraInstanceTier::FreeDb,
            region: "europe-west1".to_string(),
            cloud_provider: CloudProvider::Gcp,
            memory: "1GB".to_string(),
            neo4j_version: "5".to_string(),
            tenant_id: "tenant-1".to_string(),
            secret: SecretReference {
                name: "aura-creds".to_string(),
                ..Default::default()
            },
            connection_secret: None,
            vector_optimized: false,
            graph_analytics_plugin: false,
            suspend: false,
            timeout: None,
            interval: None,
        },
        status: None,
    }
}

/// Remote instance matching the defaults of [`aura_instance`] apart from `memory`
pub fn remote_instance(id: &str, status: &str, memory: &str) -> InstanceData {
    InstanceData {
        id: id.to_string(),
        name: "graph".to_string(),
        status: status.to_string(),
        memory: memory.to_string(),
        vector_optimized: Some(false),
        graph_analytics_plugin: Some(false),
        tenant_id: "tenant-1".to_string(),
        cloud_provider: "gcp".to_string(),
        region: "europe-west1".to_string(),
        type_: "free-db".to_string(),
        connection_url: Some(format!("neo4j+s://{id}.databases.neo4j.io")),
    }
}

#[derive(Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<String, Secret>>,
    create_failure: Mutex<Option<String>>,
}

impl MemorySecretStore {
    pub fn insert(&self, secret: Secret) {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.lock().insert(name, secret);
    }

    pub fn insert_data(&self, name: &str, entries: &[(&str, &str)]) {
        let data = entries
            .iter()
            .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
            .collect();
        self.insert(Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn get_secret(&self, name: &str) -> Option<Secret> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Make every following `create` fail with a 403
    pub fn fail_creates(&self, message: &str) {
        *self
            .create_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Secret>> {
        self.secrets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.get_secret(name))
    }

    async fn create(&self, secret: &Secret) -> Result<()> {
        let failure = self
            .create_failure
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(message) = failure {
            return Err(api_error(403, "Forbidden", &message));
        }

        let name = secret.metadata.name.clone().unwrap_or_default();
        let mut secrets = self.lock();
        if secrets.contains_key(&name) {
            return Err(api_error(
                409,
                "AlreadyExists",
                &format!("secrets \"{name}\" already exists"),
            ));
        }
        secrets.insert(name, secret.clone());
        Ok(())
    }

    async fn delete(&self, name: &str, uid: Option<&str>) -> Result<()> {
        let mut secrets = self.lock();
        let Some(existing) = secrets.get(name) else {
            return Ok(());
        };
        if let Some(uid) = uid {
            if existing.metadata.uid.as_deref() != Some(uid) {
                return Err(api_error(409, "Conflict", "Precondition failed: UID"));
            }
        }
        secrets.remove(name);
        Ok(())
    }
}

/// Number of calls the fake Aura API has served
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Calls {
    pub gateways: usize,
    pub lists: usize,
    pub gets: usize,
    pub creates: usize,
    pub patches: usize,
}

impl Calls {
    pub fn upstream(&self) -> usize {
        self.lists + self.gets + self.creates + self.patches
    }
}

#[derive(Default)]
struct FakeState {
    summaries: Vec<InstanceSummary>,
    instances: BTreeMap<String, InstanceData>,
    calls: Calls,
    created: usize,
    last_create: Option<CreateInstanceRequest>,
    last_patch: Option<PatchInstanceRequest>,
    last_credentials: Option<ClientCredentials>,
    last_timeout: Option<Duration>,
    reject_list: Option<(u16, String)>,
    reject_get: Option<(u16, String)>,
    reject_create: Option<(u16, String)>,
    reject_patch: Option<(u16, String)>,
    delay: Option<Duration>,
}

/// Fake Aura tenant that doubles as its own gateway factory.
///
/// Clones share state, so a test keeps one handle while the engine holds
/// the boxed gateway.
#[derive(Clone, Default)]
pub struct FakeAura {
    state: Arc<Mutex<FakeState>>,
}

impl FakeAura {
    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_summary(&self, id: &str, name: &str) {
        self.lock().summaries.push(InstanceSummary {
            id: id.to_string(),
            name: name.to_string(),
            tenant_id: "tenant-1".to_string(),
            cloud_provider: "gcp".to_string(),
        });
    }

    /// Make an instance visible to `get_instance`
    pub fn put_instance(&self, instance: InstanceData) {
        self.lock().instances.insert(instance.id.clone(), instance);
    }

    /// Delete an instance out-of-band, as if removed through the Aura console
    pub fn remove_instance(&self, id: &str) {
        let mut state = self.lock();
        state.instances.remove(id);
        state.summaries.retain(|summary| summary.id != id);
    }

    pub fn set_status(&self, id: &str, status: &str) {
        if let Some(instance) = self.lock().instances.get_mut(id) {
            instance.status = status.to_string();
        }
    }

    pub fn instance(&self, id: &str) -> Option<InstanceData> {
        self.lock().instances.get(id).cloned()
    }

    pub fn reject_list(&self, code: u16, body: &str) {
        self.lock().reject_list = Some((code, body.to_string()));
    }

    pub fn reject_get(&self, code: u16, body: &str) {
        self.lock().reject_get = Some((code, body.to_string()));
    }

    pub fn reject_create(&self, code: u16, body: &str) {
        self.lock().reject_create = Some((code, body.to_string()));
    }

    pub fn reject_patch(&self, code: u16, body: &str) {
        self.lock().reject_patch = Some((code, body.to_string()));
    }

    /// Delay every upstream call
    pub fn delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    pub fn calls(&self) -> Calls {
        self.lock().calls
    }

    pub fn last_create(&self) -> Option<CreateInstanceRequest> {
        self.lock().last_create.clone()
    }

    pub fn last_patch(&self) -> Option<PatchInstanceRequest> {
        self.lock().last_patch.clone()
    }

    pub fn last_credentials(&self) -> Option<ClientCredentials> {
        self.lock().last_credentials.clone()
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.lock().last_timeout
    }

    async fn pause(&self) {
        let delay = self.lock().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn rejected(action: &'static str, rejection: &Option<(u16, String)>) -> Result<()> {
    match rejection {
        Some((code, body)) => Err(Error::UpstreamRejected {
            action,
            code: *code,
            body: body.clone(),
        }),
        None => Ok(()),
    }
}

#[async_trait]
impl InstanceGateway for FakeAura {
    async fn list_instances(&self, tenant_id: &str) -> Result<Vec<InstanceSummary>> {
        self.pause().await;
        let mut state = self.lock();
        state.calls.lists += 1;
        rejected("get instance list", &state.reject_list)?;
        Ok(state
            .summaries
            .iter()
            .filter(|summary| summary.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceData>> {
        self.pause().await;
        let mut state = self.lock();
        state.calls.gets += 1;
        rejected("get instance", &state.reject_get)?;
        Ok(state.instances.get(instance_id).cloned())
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<CreatedInstance> {
        self.pause().await;
        let mut state = self.lock();
        state.calls.creates += 1;
        state.last_create = Some(request.clone());
        rejected("create the instance", &state.reject_create)?;

        state.created += 1;
        let id = format!("created-{}", state.created);
        state.summaries.push(InstanceSummary {
            id: id.clone(),
            name: request.name.clone(),
            tenant_id: request.tenant_id.clone(),
            cloud_provider: request.cloud_provider.clone(),
        });
        state.instances.insert(
            id.clone(),
            InstanceData {
                id: id.clone(),
                name: request.name.clone(),
                status: "creating".to_string(),
                memory: request.memory.clone(),
                vector_optimized: Some(request.vector_optimized),
                graph_analytics_plugin: Some(request.graph_analytics_plugin),
                tenant_id: request.tenant_id.clone(),
                cloud_provider: request.cloud_provider.clone(),
                region: request.region.clone(),
                type_: request.type_.clone(),
                connection_url: Some(format!("neo4j+s://{id}.databases.neo4j.io")),
            },
        );

        Ok(CreatedInstance {
            connection_url: format!("neo4j+s://{id}.databases.neo4j.io"),
            id,
            username: "neo4j".to_string(),
            password: "generated".to_string(),
        })
    }

    async fn patch_instance(
        &self,
        instance_id: &str,
        request: &PatchInstanceRequest,
    ) -> Result<()> {
        self.pause().await;
        let mut state = self.lock();
        state.calls.patches += 1;
        state.last_patch = Some(request.clone());
        rejected("update instance", &state.reject_patch)?;

        if let Some(instance) = state.instances.get_mut(instance_id) {
            if let Some(memory) = &request.memory {
                instance.memory = memory.clone();
            }
            if let Some(vector) = request.vector_optimized {
                instance.vector_optimized = Some(vector);
            }
            if let Some(analytics) = request.graph_analytics_plugin {
                instance.graph_analytics_plugin = Some(analytics);
            }
        }
        Ok(())
    }
}

impl GatewayFactory for FakeAura {
    fn gateway(
        &self,
        credentials: ClientCredentials,
        timeout: Duration,
    ) -> Result<Box<dyn InstanceGateway>> {
        let mut state = self.lock();
        state.calls.gateways += 1;
        state.last_credentials = Some(credentials);
        state.last_timeout = Some(timeout);
        Ok(Box::new(self.clone()))
    }
}
