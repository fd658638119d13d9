//! Resolve Aura API client credentials from the referenced Secret

use k8s_openapi::api::core::v1::Secret;
use tracing::debug;

use super::secrets::SecretStore;
use crate::aura::ClientCredentials;
use crate::crd::SecretReference;
use crate::error::{Error, Result};

/// Read the client id and secret using the configured (or default) keys.
///
/// A missing Secret is reported with its name; a missing or empty key is
/// reported with the key names actually in effect.
pub async fn resolve_credentials(
    secrets: &dyn SecretStore,
    reference: &SecretReference,
) -> Result<ClientCredentials> {
    let secret = secrets
        .get(&reference.name)
        .await?
        .ok_or_else(|| Error::SecretNotFound(reference.name.clone()))?;

    let client_id_key = reference.client_id_key();
    let client_secret_key = reference.client_secret_key();

    let client_id = secret_value(&secret, client_id_key).unwrap_or_default();
    let client_secret = secret_value(&secret, client_secret_key).unwrap_or_default();
    if client_id.is_empty() || client_secret.is_empty() {
        return Err(Error::InvalidCredential {
            client_id_key: client_id_key.to_string(),
            client_secret_key: client_secret_key.to_string(),
        });
    }

    debug!(
        secret = %reference.name,
        client_id_key,
        client_secret_key,
        "Resolved Aura API credentials"
    );
    Ok(ClientCredentials {
        client_id,
        client_secret,
    })
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    if let Some(value) = secret.data.as_ref().and_then(|data| data.get(key)) {
        return Some(String::from_utf8_lossy(&value.0).into_owned());
    }
    secret
        .string_data
        .as_ref()
        .and_then(|data| data.get(key))
        .cloned()
}
