//! Status sub-resource writes
//!
//! The whole status is sent as a JSON merge patch that also carries the
//! `resourceVersion` the status was computed from. A concurrent write makes
//! the API server answer 409; the latest object is then re-read and the
//! patch retried against its version.

use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::crd::{AuraInstance, AuraInstanceStatus};
use crate::error::{Error, Result};

pub const FIELD_MANAGER: &str = "aura-operator";

const MAX_ATTEMPTS: usize = 3;

/// Merge patch replacing the status, guarded by `resource_version` when known
pub fn status_patch(resource_version: Option<&str>, status: &AuraInstanceStatus) -> Result<Value> {
    let status = serde_json::to_value(status)?;
    Ok(match resource_version {
        Some(rv) => json!({
            "metadata": { "resourceVersion": rv },
            "status": status,
        }),
        None => json!({ "status": status }),
    })
}

fn unchanged(stored: Option<&AuraInstanceStatus>, status: &AuraInstanceStatus) -> bool {
    stored == Some(status)
}

/// Persist `status` for `instance`.
///
/// Skips the write when the stored status is already identical. A record
/// deleted in the meantime is not an error.
pub async fn patch_status(
    api: &Api<AuraInstance>,
    instance: &AuraInstance,
    status: &AuraInstanceStatus,
) -> Result<()> {
    let name = instance.name_any();
    let mut resource_version = instance.resource_version();
    let mut stored = instance.status.clone();

    let mut attempt = 0;
    loop {
        attempt += 1;
        if unchanged(stored.as_ref(), status) {
            debug!(name = %name, "Status unchanged, skipping write");
            return Ok(());
        }

        let patch = status_patch(resource_version.as_deref(), status)?;
        let params = PatchParams::apply(FIELD_MANAGER);
        match api.patch_status(&name, &params, &Patch::Merge(&patch)).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(name = %name, "AuraInstance is gone, dropping status update");
                return Ok(());
            }
            Err(kube::Error::Api(e)) if e.code == 409 && attempt < MAX_ATTEMPTS => {
                warn!(name = %name, attempt, "Status update conflicted, re-reading");
                let Some(latest) = api.get_opt(&name).await? else {
                    return Ok(());
                };
                resource_version = latest.resource_version();
                stored = latest.status;
            }
            Err(e) => return Err(Error::KubeError(e)),
        }
    }
}
