//! Reconciliation engine for AuraInstance
//!
//! One call to [`Engine::reconcile`] is one pass. The engine works on an
//! in-memory copy of the status and talks to the outside world only through
//! [`SecretStore`] and [`GatewayFactory`], so it runs without a cluster.
//!
//! Effective states, derived from `status.instanceId` and the remote status:
//!
//! | State                   | Action                                   | Requeue      |
//! |-------------------------|------------------------------------------|--------------|
//! | unbound, name matches   | adopt remote id                          | immediate    |
//! | unbound, no match       | create instance + connection Secret      | 30s          |
//! | bound, remote missing   | delete owned Secret, clear binding       | immediate    |
//! | bound, creating         | `Reconciling=True/InstanceCreating`      | 30s          |
//! | bound, running          | `Ready=True/InstanceRunning`, drift check| default      |
//! | bound, other            | `Ready=False/InstanceNotReady`, drift    | default      |

use std::time::Duration;

use kube::ResourceExt;
use tracing::{info, instrument, warn};

use super::conditions::{mark_ready, mark_reconciling};
use super::connection::{build_connection_secret, delete_connection_secret};
use super::credentials::resolve_credentials;
use super::secrets::SecretStore;
use crate::aura::{
    CreateInstanceRequest, GatewayFactory, InstanceData, InstanceGateway, InstanceState,
    InstanceSummary, PatchInstanceRequest,
};
use crate::crd::{AuraInstance, AuraInstanceSpec, AuraInstanceStatus};
use crate::error::{Error, Result};

/// Delay before looking at an instance that is still being provisioned
pub const PROVISIONING_REQUEUE: Duration = Duration::from_secs(30);

/// When the framework should run the next pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    Immediate,
    After(Duration),
    /// The caller's default schedule, or the record's interval when set
    Default,
}

/// Result of a pass that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub requeue: Requeue,
    /// Id of the instance created during this pass
    pub created_instance: Option<String>,
}

impl Outcome {
    fn requeue(requeue: Requeue) -> Self {
        Self {
            requeue,
            created_instance: None,
        }
    }
}

pub struct Engine<'a> {
    secrets: &'a dyn SecretStore,
    gateways: &'a dyn GatewayFactory,
    timeout: Duration,
}

impl<'a> Engine<'a> {
    pub fn new(
        secrets: &'a dyn SecretStore,
        gateways: &'a dyn GatewayFactory,
        timeout: Duration,
    ) -> Self {
        Self {
            secrets,
            gateways,
            timeout,
        }
    }

    /// Run one pass, mutating `status` in place.
    ///
    /// On error the status keeps whatever was decided before the failing
    /// call; the caller converts the error into a `Ready=False` condition.
    #[instrument(skip(self, instance, status), fields(name = %instance.name_any(), namespace = instance.namespace()))]
    pub async fn reconcile(
        &self,
        instance: &AuraInstance,
        status: &mut AuraInstanceStatus,
    ) -> Result<Outcome> {
        let credentials = resolve_credentials(self.secrets, &instance.spec.secret).await?;
        let gateway = self.gateways.gateway(credentials, self.timeout)?;

        match status.bound_instance_id().map(str::to_string) {
            Some(instance_id) => {
                self.reconcile_bound(gateway.as_ref(), instance, status, &instance_id)
                    .await
            }
            None => self.reconcile_unbound(gateway.as_ref(), instance, status).await,
        }
    }

    async fn reconcile_bound(
        &self,
        gateway: &dyn InstanceGateway,
        instance: &AuraInstance,
        status: &mut AuraInstanceStatus,
        instance_id: &str,
    ) -> Result<Outcome> {
        let generation = instance.metadata.generation;

        let Some(remote) = gateway.get_instance(instance_id).await? else {
            info!("Aura instance {} no longer exists, releasing binding", instance_id);
            let secret_name = status
                .connection_secret
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| instance.connection_secret_name());
            delete_connection_secret(self.secrets, instance, &secret_name).await?;

            status.instance_id = None;
            status.connection_secret = None;
            return Ok(Outcome::requeue(Requeue::Immediate));
        };

        status.instance_status = Some(remote.status.clone());

        match remote.state() {
            InstanceState::Running => {
                mark_ready(status, true, "InstanceRunning", "Instance is running", generation);
            }
            InstanceState::Creating => {
                mark_reconciling(
                    status,
                    "InstanceCreating",
                    "Instance is being created",
                    generation,
                );
                return Ok(Outcome::requeue(Requeue::After(PROVISIONING_REQUEUE)));
            }
            InstanceState::Other(state) => {
                mark_ready(
                    status,
                    false,
                    "InstanceNotReady",
                    &format!("Instance status: {state}"),
                    generation,
                );
            }
        }

        if let Some(patch) = detect_drift(&instance.spec, &remote) {
            info!("Aura instance {} drifted from spec, updating", instance_id);
            mark_reconciling(status, "UpdatingInstance", "Updating Aura instance", generation);
            gateway.patch_instance(instance_id, &patch).await?;
        }

        Ok(Outcome::requeue(Requeue::Default))
    }

    async fn reconcile_unbound(
        &self,
        gateway: &dyn InstanceGateway,
        instance: &AuraInstance,
        status: &mut AuraInstanceStatus,
    ) -> Result<Outcome> {
        let name = instance.name_any();
        let remotes = gateway.list_instances(&instance.spec.tenant_id).await?;

        if let Some(existing) = find_by_name(&remotes, &name) {
            info!("Adopting existing Aura instance {} for {}", existing.id, name);
            status.instance_id = Some(existing.id.clone());
            return Ok(Outcome::requeue(Requeue::Immediate));
        }

        info!("Creating new Aura instance for {}", name);
        mark_reconciling(
            status,
            "CreatingInstance",
            "Creating new Aura instance",
            instance.metadata.generation,
        );

        let created = gateway
            .create_instance(&CreateInstanceRequest::for_instance(instance))
            .await?;

        let secret_name = instance.connection_secret_name();
        let secret = build_connection_secret(instance, &secret_name, &created);
        self.secrets
            .create(&secret)
            .await
            .map_err(|e| Error::CreateFollowupFailed(e.to_string()))?;

        status.instance_id = Some(created.id.clone());
        status.connection_secret = Some(secret_name);

        Ok(Outcome {
            requeue: Requeue::After(PROVISIONING_REQUEUE),
            created_instance: Some(created.id),
        })
    }
}

/// First remote instance whose name equals `name` exactly.
///
/// Duplicate names are logged and otherwise resolved by list order.
pub fn find_by_name<'r>(remotes: &'r [InstanceSummary], name: &str) -> Option<&'r InstanceSummary> {
    let mut matches = remotes.iter().filter(|remote| remote.name == name);
    let first = matches.next()?;
    let duplicates = matches.count();
    if duplicates > 0 {
        warn!(
            "{} Aura instances are named {}, adopting the first ({})",
            duplicates + 1,
            name,
            first.id
        );
    }
    Some(first)
}

/// Compare the managed fields and build a patch when any of them differ.
///
/// An empty `spec.memory` leaves memory unmanaged.
pub fn detect_drift(spec: &AuraInstanceSpec, remote: &InstanceData) -> Option<PatchInstanceRequest> {
    let manage_memory = !spec.memory.is_empty();
    let memory_drift = manage_memory && spec.memory != remote.memory;
    let vector_drift = spec.vector_optimized != remote.vector_optimized.unwrap_or(false);
    let analytics_drift =
        spec.graph_analytics_plugin != remote.graph_analytics_plugin.unwrap_or(false);

    if !(memory_drift || vector_drift || analytics_drift) {
        return None;
    }

    Some(PatchInstanceRequest {
        memory: manage_memory.then(|| spec.memory.clone()),
        vector_optimized: Some(spec.vector_optimized),
        graph_analytics_plugin: Some(spec.graph_analytics_plugin),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::conditions::{READY, RECONCILING, STATUS_FALSE, STATUS_TRUE};
    use crate::testing::{aura_instance, remote_instance, FakeAura, MemorySecretStore};

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn setup() -> (AuraInstance, MemorySecretStore, FakeAura) {
        let store = MemorySecretStore::default();
        store.insert_data("aura-creds", &[("clientID", "id"), ("clientSecret", "secret")]);
        (aura_instance("graph"), store, FakeAura::default())
    }

    fn bound(id: &str) -> AuraInstanceStatus {
        AuraInstanceStatus {
            instance_id: Some(id.to_string()),
            connection_secret: Some("graph-connection".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unbound_adopts_remote_with_same_name() {
        let (instance, store, aura) = setup();
        aura.add_summary("other-id", "other");
        aura.add_summary("graph-id", "graph");

        let mut status = AuraInstanceStatus::default();
        let outcome = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        assert_eq!(outcome.requeue, Requeue::Immediate);
        assert_eq!(status.instance_id.as_deref(), Some("graph-id"));
        assert_eq!(aura.calls().creates, 0);
        assert!(status.conditions.is_empty());
    }

    #[tokio::test]
    async fn test_adoption_is_case_sensitive_and_first_match_wins() {
        let (instance, store, aura) = setup();
        aura.add_summary("upper", "Graph");
        aura.add_summary("first", "graph");
        aura.add_summary("second", "graph");

        let mut status = AuraInstanceStatus::default();
        Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");
        assert_eq!(status.instance_id.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_unbound_without_match_creates_instance_and_secret() {
        let (instance, store, aura) = setup();

        let mut status = AuraInstanceStatus::default();
        let outcome = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        assert_eq!(outcome.requeue, Requeue::After(PROVISIONING_REQUEUE));
        assert_eq!(outcome.created_instance.as_deref(), Some("created-1"));
        assert_eq!(aura.calls().creates, 1);
        assert_eq!(status.instance_id.as_deref(), Some("created-1"));
        assert_eq!(status.connection_secret.as_deref(), Some("graph-connection"));
        assert!(store.contains("graph-connection"));

        let reconciling = status.condition(RECONCILING).expect("reconciling");
        assert_eq!(reconciling.status, STATUS_TRUE);
        assert_eq!(reconciling.reason, "CreatingInstance");

        let request = aura.last_create().expect("create request");
        assert_eq!(request.name, "graph");
        assert_eq!(request.tenant_id, "tenant-1");
        assert_eq!(request.type_, "free-db");
    }

    #[tokio::test]
    async fn test_create_rejection_leaves_no_secret() {
        let (instance, store, aura) = setup();
        aura.reject_create(503, "capacity");

        let mut status = AuraInstanceStatus::default();
        let err = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect_err("create rejected");

        assert_eq!(
            err.to_string(),
            "failed to create the instance, request failed with code 503 - capacity"
        );
        assert!(!store.contains("graph-connection"));
        assert!(status.bound_instance_id().is_none());
    }

    #[tokio::test]
    async fn test_secret_persistence_failure_after_create() {
        let (instance, store, aura) = setup();
        store.fail_creates("secrets is forbidden");

        let mut status = AuraInstanceStatus::default();
        let err = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect_err("follow-up fails");

        assert!(matches!(err, Error::CreateFollowupFailed(_)));
        assert_eq!(aura.calls().creates, 1);
        // Next pass finds the instance by name instead of creating another
        assert!(status.bound_instance_id().is_none());
        Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("adopts");
        assert_eq!(status.instance_id.as_deref(), Some("created-1"));
        assert_eq!(aura.calls().creates, 1);
    }

    #[tokio::test]
    async fn test_bound_running_sets_ready() {
        let (instance, store, aura) = setup();
        aura.put_instance(remote_instance("abc", "running", "1GB"));

        let mut status = bound("abc");
        let outcome = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        assert_eq!(outcome.requeue, Requeue::Default);
        assert_eq!(status.instance_status.as_deref(), Some("running"));
        let ready = status.condition(READY).expect("ready");
        assert_eq!(ready.status, STATUS_TRUE);
        assert_eq!(ready.reason, "InstanceRunning");
        assert!(status.condition(RECONCILING).is_none());
        assert_eq!(aura.calls().patches, 0);
    }

    #[tokio::test]
    async fn test_bound_creating_skips_drift_check() {
        let (instance, store, aura) = setup();
        aura.put_instance(remote_instance("abc", "creating", "8GB"));

        let mut status = bound("abc");
        let outcome = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        assert_eq!(outcome.requeue, Requeue::After(PROVISIONING_REQUEUE));
        assert_eq!(
            status.condition(RECONCILING).map(|c| c.reason.as_str()),
            Some("InstanceCreating")
        );
        assert_eq!(aura.calls().patches, 0);
    }

    #[tokio::test]
    async fn test_bound_other_status_is_not_ready() {
        let (instance, store, aura) = setup();
        aura.put_instance(remote_instance("abc", "paused", "1GB"));

        let mut status = bound("abc");
        Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        let ready = status.condition(READY).expect("ready");
        assert_eq!(ready.status, STATUS_FALSE);
        assert_eq!(ready.reason, "InstanceNotReady");
        assert_eq!(ready.message, "Instance status: paused");
    }

    #[tokio::test]
    async fn test_drift_triggers_patch() {
        let (mut instance, store, aura) = setup();
        instance.spec.vector_optimized = true;
        aura.put_instance(remote_instance("abc", "running", "2GB"));

        let mut status = bound("abc");
        Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        assert_eq!(aura.calls().patches, 1);
        let patch = aura.last_patch().expect("patch sent");
        assert_eq!(patch.memory.as_deref(), Some("1GB"));
        assert_eq!(patch.vector_optimized, Some(true));
        assert_eq!(
            status.condition(RECONCILING).map(|c| c.reason.as_str()),
            Some("UpdatingInstance")
        );
    }

    #[tokio::test]
    async fn test_unset_memory_is_not_patched_until_declared() {
        let (mut instance, store, aura) = setup();
        instance.spec.memory = String::new();
        aura.put_instance(remote_instance("abc", "running", "16GB"));

        let mut status = bound("abc");
        Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");
        assert_eq!(aura.calls().patches, 0);
        assert!(status.condition(RECONCILING).is_none());

        instance.spec.memory = "2GB".to_string();
        Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");
        assert_eq!(aura.calls().patches, 1);
        let patch = aura.last_patch().expect("patch sent");
        assert_eq!(patch.memory.as_deref(), Some("2GB"));
    }

    #[tokio::test]
    async fn test_rejected_patch_fails_pass() {
        let (mut instance, store, aura) = setup();
        instance.spec.memory = "4GB".to_string();
        aura.put_instance(remote_instance("abc", "running", "1GB"));
        aura.reject_patch(422, "memory not allowed for tier");

        let mut status = bound("abc");
        let err = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect_err("patch rejected");
        assert_eq!(
            err.to_string(),
            "failed to update instance, request failed with code 422 - memory not allowed for tier"
        );
    }

    #[tokio::test]
    async fn test_remote_missing_clears_binding_and_secret() {
        let (instance, store, aura) = setup();
        let created = crate::aura::CreatedInstance {
            id: "abc".to_string(),
            ..Default::default()
        };
        store.insert(build_connection_secret(&instance, "graph-connection", &created));

        let mut status = bound("abc");
        mark_ready(&mut status, true, "InstanceRunning", "Instance is running", Some(1));
        let before = status.conditions.clone();

        let outcome = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect("pass succeeds");

        assert_eq!(outcome.requeue, Requeue::Immediate);
        assert!(status.instance_id.is_none());
        assert!(status.connection_secret.is_none());
        assert!(!store.contains("graph-connection"));
        assert_eq!(status.conditions, before);
    }

    #[tokio::test]
    async fn test_remote_missing_with_foreign_secret_fails_and_keeps_binding() {
        let (instance, store, aura) = setup();
        let mut other = aura_instance("graph");
        other.metadata.uid = Some("uid-other".to_string());
        store.insert(build_connection_secret(
            &other,
            "graph-connection",
            &crate::aura::CreatedInstance::default(),
        ));

        let engine = Engine::new(&store, &aura, TIMEOUT);
        let mut status = bound("abc");
        for _ in 0..2 {
            let err = engine
                .reconcile(&instance, &mut status)
                .await
                .expect_err("foreign Secret must fail the pass");
            assert!(matches!(err, Error::OwnershipMismatch { .. }));
        }

        assert!(store.contains("graph-connection"));
        assert_eq!(status.instance_id.as_deref(), Some("abc"));
        assert_eq!(status.connection_secret.as_deref(), Some("graph-connection"));
        assert_eq!(aura.calls().creates, 0);
    }

    #[tokio::test]
    async fn test_get_server_error_fails_pass() {
        let (instance, store, aura) = setup();
        aura.reject_get(500, "boom");

        let mut status = bound("abc");
        let err = Engine::new(&store, &aura, TIMEOUT)
            .reconcile(&instance, &mut status)
            .await
            .expect_err("500");
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_detect_drift_only_on_difference() {
        let instance = aura_instance("graph");
        let same = remote_instance("abc", "running", "1GB");
        assert!(detect_drift(&instance.spec, &same).is_none());

        let mut analytics = same.clone();
        analytics.graph_analytics_plugin = Some(true);
        assert!(detect_drift(&instance.spec, &analytics).is_some());
    }

    #[test]
    fn test_detect_drift_ignores_memory_when_unset() {
        let mut instance = aura_instance("graph");
        instance.spec.memory = String::new();
        let remote = remote_instance("abc", "running", "16GB");
        assert!(detect_drift(&instance.spec, &remote).is_none());

        instance.spec.vector_optimized = true;
        let patch = detect_drift(&instance.spec, &remote).expect("drift");
        assert_eq!(patch.memory, None);
    }
}
