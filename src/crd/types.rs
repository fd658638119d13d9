//! Shared types for the AuraInstance CRD

use std::fmt;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Neo4j Aura instance tier
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuraInstanceTier {
    FreeDb,
    ProfessionalDb,
    BusinessCritical,
    EnterpriseDb,
}

impl AuraInstanceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuraInstanceTier::FreeDb => "free-db",
            AuraInstanceTier::ProfessionalDb => "professional-db",
            AuraInstanceTier::BusinessCritical => "business-critical",
            AuraInstanceTier::EnterpriseDb => "enterprise-db",
        }
    }
}

impl fmt::Display for AuraInstanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud provider hosting the instance
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
    Azure,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Azure => "azure",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const DEFAULT_CLIENT_ID_KEY: &str = "clientID";
pub const DEFAULT_CLIENT_SECRET_KEY: &str = "clientSecret";

/// Reference to a Secret holding Aura API client credentials
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    /// Name of the Secret in the same namespace as the AuraInstance
    pub name: String,

    /// Key holding the client id (defaults to `clientID`)
    #[serde(
        rename = "clientIDKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_id_key: Option<String>,

    /// Key holding the client secret (defaults to `clientSecret`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_key: Option<String>,
}

impl SecretReference {
    pub fn client_id_key(&self) -> &str {
        non_empty(self.client_id_key.as_deref()).unwrap_or(DEFAULT_CLIENT_ID_KEY)
    }

    pub fn client_secret_key(&self) -> &str {
        non_empty(self.client_secret_key.as_deref()).unwrap_or(DEFAULT_CLIENT_SECRET_KEY)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Reference to an object by name in the same namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    /// True, False or Unknown
    pub status: String,
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("duration pattern is valid")
});

/// Parse a Go-style duration string (`"30s"`, `"5m"`, `"1h30m"`, `"750ms"`).
///
/// The whole input must be made of `<number><unit>` parts; negative values
/// are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let mut consumed = 0;
    let mut total_nanos = 0f64;
    for caps in DURATION_PART.captures_iter(input) {
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        let Some((start, end)) = whole else { continue };
        if start != consumed {
            return Err(format!("invalid duration {input:?}"));
        }
        consumed = end;

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        let nanos_per_unit = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(format!("unknown unit in duration {input:?}")),
        };
        total_nanos += value * nanos_per_unit;
    }

    if consumed != input.len() {
        return Err(format!("invalid duration {input:?}"));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}
