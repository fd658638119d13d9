//! AuraInstance Custom Resource Definition
//!
//! An AuraInstance declares a Neo4j Aura database that the operator creates,
//! adopts and keeps in sync with the declared configuration.

use std::time::Duration;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    parse_duration, AuraInstanceTier, CloudProvider, Condition, LocalObjectReference,
    SecretReference,
};

/// The AuraInstance CRD represents one managed Neo4j Aura instance.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "neo4j.infra.doodle.com",
    version = "v1beta1",
    kind = "AuraInstance",
    namespaced,
    status = "AuraInstanceStatus",
    shortname = "aura",
    printcolumn = r#"{"name":"Tier","type":"string","jsonPath":".spec.tier"}"#,
    printcolumn = r#"{"name":"Instance","type":"string","jsonPath":".status.instanceId"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.instanceStatus"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AuraInstanceSpec {
    /// Aura instance tier
    pub tier: AuraInstanceTier,

    /// Cloud region for the instance, e.g. "europe-west1"
    pub region: String,

    /// Cloud provider hosting the instance
    pub cloud_provider: CloudProvider,

    /// Memory allocation, e.g. "1GB" or "8GB"
    #[serde(default)]
    pub memory: String,

    /// Neo4j major version, e.g. "5"
    pub neo4j_version: String,

    /// Aura tenant (project) the instance belongs to
    #[serde(rename = "tenantID")]
    pub tenant_id: String,

    /// Secret with Aura API client credentials.
    /// Keys default to `clientID` and `clientSecret`.
    pub secret: SecretReference,

    /// Secret that receives the connection details.
    /// Defaults to `<metadata.name>-connection`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_secret: Option<LocalObjectReference>,

    #[serde(default)]
    pub vector_optimized: bool,

    #[serde(default)]
    pub graph_analytics_plugin: bool,

    /// Stop reconciling this instance; existing status is left as is
    #[serde(default)]
    pub suspend: bool,

    /// Deadline for one reconciliation pass and its upstream requests, e.g. "1m"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Fixed re-evaluation interval after a successful pass, e.g. "10m"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
}

impl AuraInstanceSpec {
    /// Validate fields that the schema cannot express
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.name.trim().is_empty() {
            return Err("secret.name must not be empty".to_string());
        }
        if self.tenant_id.trim().is_empty() {
            return Err("tenantID must not be empty".to_string());
        }
        self.timeout_duration()?;
        self.interval_duration()?;
        Ok(())
    }

    pub fn timeout_duration(&self) -> Result<Option<Duration>, String> {
        parse_optional("timeout", self.timeout.as_deref())
    }

    pub fn interval_duration(&self) -> Result<Option<Duration>, String> {
        parse_optional("interval", self.interval.as_deref())
    }
}

fn parse_optional(field: &str, value: Option<&str>) -> Result<Option<Duration>, String> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => Ok(None),
        Some(v) => parse_duration(v)
            .map(Some)
            .map_err(|e| format!("{field}: {e}")),
    }
}

impl AuraInstance {
    /// Name of the Secret that holds the generated connection details
    pub fn connection_secret_name(&self) -> String {
        match &self.spec.connection_secret {
            Some(reference) if !reference.name.is_empty() => reference.name.clone(),
            _ => format!("{}-connection", kube::ResourceExt::name_any(self)),
        }
    }
}

/// Status subresource for AuraInstance
///
/// Optional string fields serialize as `null` when cleared so that a merge
/// patch of the whole status removes them from the stored object.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuraInstanceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last generation reconciled by the controller
    #[serde(default)]
    pub observed_generation: Option<i64>,

    /// Aura instance id once created or adopted
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Name of the Secret holding the connection details
    #[serde(default)]
    pub connection_secret: Option<String>,

    /// Last observed Aura lifecycle state, e.g. "running"
    #[serde(default)]
    pub instance_status: Option<String>,

    /// Connection Secret name under its pre-rename key. Moved into
    /// `connectionSecret` on the next pass and then written back as null.
    #[serde(default)]
    pub connection_uri: Option<String>,
}

impl AuraInstanceStatus {
    /// Carry a connection Secret name stored as `connectionUri` over to
    /// `connectionSecret`, without overwriting a name already recorded there.
    pub fn migrate_connection_uri(&mut self) {
        if let Some(legacy) = self.connection_uri.take().filter(|name| !name.is_empty()) {
            if self.connection_secret.as_deref().map_or(true, str::is_empty) {
                self.connection_secret = Some(legacy);
            }
        }
    }

    /// The bound instance id, treating an empty string as unbound
    pub fn bound_instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref().filter(|id| !id.is_empty())
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_ready(&self) -> bool {
        self.condition("Ready").map(|c| c.status == "True").unwrap_or(false)
    }
}
