//! Connection Secret generated for a freshly created Aura instance
//!
//! The Secret is written once right after creation (the password is only
//! ever returned by the create call) and removed when the remote instance
//! disappears, provided it is still owned by the same AuraInstance.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};
use tracing::{info, warn};

use super::secrets::SecretStore;
use crate::aura::CreatedInstance;
use crate::crd::AuraInstance;
use crate::error::{Error, Result};

pub const USERNAME_KEY: &str = "username";
pub const PASSWORD_KEY: &str = "password";
pub const CONNECTION_URL_KEY: &str = "connectionURL";

fn standard_labels(instance: &AuraInstance) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(
        "app.kubernetes.io/name".to_string(),
        "aura-instance".to_string(),
    );
    labels.insert("app.kubernetes.io/instance".to_string(), instance.name_any());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        "aura-operator".to_string(),
    );
    labels
}

pub fn owner_reference(instance: &AuraInstance) -> OwnerReference {
    OwnerReference {
        api_version: AuraInstance::api_version(&()).to_string(),
        kind: AuraInstance::kind(&()).to_string(),
        name: instance.name_any(),
        uid: instance.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

pub fn build_connection_secret(
    instance: &AuraInstance,
    name: &str,
    created: &CreatedInstance,
) -> Secret {
    let mut data = BTreeMap::new();
    data.insert(USERNAME_KEY.to_string(), created.username.clone());
    data.insert(PASSWORD_KEY.to_string(), created.password.clone());
    data.insert(CONNECTION_URL_KEY.to_string(), created.connection_url.clone());

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: instance.namespace(),
            labels: Some(standard_labels(instance)),
            owner_references: Some(vec![owner_reference(instance)]),
            ..Default::default()
        },
        string_data: Some(data),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Delete the connection Secret if it is owned by `instance`.
///
/// An absent Secret is fine. Ownership is decided by the controller owner
/// reference alone: when it is missing or carries another uid the Secret is
/// left in place and reported as an ownership mismatch.
pub async fn delete_connection_secret(
    secrets: &dyn SecretStore,
    instance: &AuraInstance,
    name: &str,
) -> Result<()> {
    let Some(secret) = secrets.get(name).await? else {
        return Ok(());
    };

    let expected_uid = instance.uid().unwrap_or_default();
    let controller_uid = secret
        .metadata
        .owner_references
        .iter()
        .flatten()
        .find(|owner| owner.controller == Some(true))
        .map(|owner| owner.uid.as_str());
    if controller_uid != Some(expected_uid.as_str()) {
        let found = controller_uid.unwrap_or("<none>").to_string();
        warn!(
            "Refusing to delete Secret {}: owner uid {} does not match {}",
            name, found, expected_uid
        );
        return Err(Error::OwnershipMismatch {
            secret: name.to_string(),
            found,
        });
    }

    secrets.delete(name, secret.metadata.uid.as_deref()).await?;
    info!("Removed connection Secret {} of vanished instance", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{aura_instance, MemorySecretStore};

    fn created() -> CreatedInstance {
        CreatedInstance {
            id: "abc".to_string(),
            username: "neo4j".to_string(),
            password: "pw".to_string(),
            connection_url: "neo4j+s://abc.databases.neo4j.io".to_string(),
        }
    }

    #[test]
    fn test_connection_secret_contents_and_owner() {
        let instance = aura_instance("graph");
        let secret = build_connection_secret(&instance, "graph-connection", &created());

        assert_eq!(secret.metadata.name.as_deref(), Some("graph-connection"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("default"));
        let data = secret.string_data.expect("string data");
        assert_eq!(data.get("username").map(String::as_str), Some("neo4j"));
        assert_eq!(data.get("password").map(String::as_str), Some("pw"));
        assert_eq!(
            data.get("connectionURL").map(String::as_str),
            Some("neo4j+s://abc.databases.neo4j.io")
        );

        let owners = secret.metadata.owner_references.expect("owner refs");
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].uid, "uid-graph");
        assert_eq!(owners[0].kind, "AuraInstance");
        assert_eq!(owners[0].api_version, "neo4j.infra.doodle.com/v1beta1");
    }

    #[tokio::test]
    async fn test_delete_owned_secret() {
        let instance = aura_instance("graph");
        let store = MemorySecretStore::default();
        store.insert(build_connection_secret(&instance, "graph-connection", &created()));

        delete_connection_secret(&store, &instance, "graph-connection")
            .await
            .expect("owned secret is deleted");
        assert!(!store.contains("graph-connection"));
    }

    #[tokio::test]
    async fn test_delete_missing_secret_is_ok() {
        let instance = aura_instance("graph");
        let store = MemorySecretStore::default();
        assert!(delete_connection_secret(&store, &instance, "graph-connection")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_foreign_secret_is_not_deleted() {
        let instance = aura_instance("graph");
        let mut impostor = aura_instance("graph");
        impostor.metadata.uid = Some("someone-else".to_string());

        let store = MemorySecretStore::default();
        store.insert(build_connection_secret(&impostor, "graph-connection", &created()));

        let err = delete_connection_secret(&store, &instance, "graph-connection")
            .await
            .expect_err("must refuse");
        assert_eq!(
            err.to_string(),
            "failed to delete secret, owner uid someone-else does not match"
        );
        assert!(store.contains("graph-connection"));
    }

    #[tokio::test]
    async fn test_unowned_secret_is_not_deleted() {
        let instance = aura_instance("graph");
        let store = MemorySecretStore::default();
        store.insert_data("graph-connection", &[("username", "x")]);

        let err = delete_connection_secret(&store, &instance, "graph-connection")
            .await
            .expect_err("must refuse");
        assert!(matches!(err, Error::OwnershipMismatch { .. }));
        assert!(store.contains("graph-connection"));
    }

    #[tokio::test]
    async fn test_only_controller_reference_grants_ownership() {
        let instance = aura_instance("graph");
        let mut impostor = aura_instance("graph");
        impostor.metadata.uid = Some("someone-else".to_string());

        let mut secret = build_connection_secret(&impostor, "graph-connection", &created());
        let mut secondary = owner_reference(&instance);
        secondary.controller = None;
        if let Some(owners) = secret.metadata.owner_references.as_mut() {
            owners.push(secondary);
        }
        let store = MemorySecretStore::default();
        store.insert(secret);

        let err = delete_connection_secret(&store, &instance, "graph-connection")
            .await
            .expect_err("non-controller reference is not ownership");
        assert!(matches!(
            err,
            Error::OwnershipMismatch { ref found, .. } if found == "someone-else"
        ));
        assert!(store.contains("graph-connection"));
    }
}
