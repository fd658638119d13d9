//! Wire types for the Neo4j Aura API v1
//!
//! Every response body is wrapped in a `{"data": ...}` envelope and uses
//! snake_case field names.

use serde::{Deserialize, Serialize};

use crate::crd::AuraInstance;

#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// Entry returned by `GET /instances`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InstanceSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub cloud_provider: String,
}

/// Body returned by `GET /instances/{id}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InstanceData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub memory: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_optimized: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_analytics_plugin: Option<bool>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub cloud_provider: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_url: Option<String>,
}

/// Lifecycle state of a remote instance as far as reconciliation cares
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Creating,
    Other(String),
}

impl From<&str> for InstanceState {
    fn from(status: &str) -> Self {
        match status {
            "running" => InstanceState::Running,
            "creating" => InstanceState::Creating,
            other => InstanceState::Other(other.to_string()),
        }
    }
}

impl InstanceData {
    pub fn state(&self) -> InstanceState {
        InstanceState::from(self.status.as_str())
    }
}

/// Body for `POST /instances`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub version: String,
    pub region: String,
    pub memory: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub tenant_id: String,
    pub cloud_provider: String,
    pub vector_optimized: bool,
    pub graph_analytics_plugin: bool,
}

impl CreateInstanceRequest {
    pub fn for_instance(instance: &AuraInstance) -> Self {
        let spec = &instance.spec;
        Self {
            name: kube::ResourceExt::name_any(instance),
            version: spec.neo4j_version.clone(),
            region: spec.region.clone(),
            memory: spec.memory.clone(),
            type_: spec.tier.as_str().to_string(),
            tenant_id: spec.tenant_id.clone(),
            cloud_provider: spec.cloud_provider.as_str().to_string(),
            vector_optimized: spec.vector_optimized,
            graph_analytics_plugin: spec.graph_analytics_plugin,
        }
    }
}

/// Body returned by a successful `POST /instances`
#[derive(Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CreatedInstance {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub connection_url: String,
}

impl std::fmt::Debug for CreatedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreatedInstance")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("connection_url", &self.connection_url)
            .finish()
    }
}

/// Body for `PATCH /instances/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchInstanceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_optimized: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_analytics_plugin: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_state_classification() {
        assert_eq!(InstanceState::from("running"), InstanceState::Running);
        assert_eq!(InstanceState::from("creating"), InstanceState::Creating);
        assert_eq!(
            InstanceState::from("paused"),
            InstanceState::Other("paused".to_string())
        );
        // Status strings are case-sensitive on the wire
        assert_eq!(
            InstanceState::from("Running"),
            InstanceState::Other("Running".to_string())
        );
    }

    #[test]
    fn test_instance_data_tolerates_missing_optional_fields() {
        let body = r#"{"data":{"id":"abc","status":"running","memory":"2GB"}}"#;
        let parsed: Envelope<InstanceData> = serde_json::from_str(body).expect("valid body");
        assert_eq!(parsed.data.id, "abc");
        assert_eq!(parsed.data.vector_optimized, None);
        assert_eq!(parsed.data.state(), InstanceState::Running);
    }

    #[test]
    fn test_created_instance_debug_hides_password() {
        let created = CreatedInstance {
            id: "abc".to_string(),
            username: "neo4j".to_string(),
            password: "hunter2".to_string(),
            connection_url: "neo4j+s://abc.databases.neo4j.io".to_string(),
        };
        assert!(!format!("{created:?}").contains("hunter2"));
    }
}
