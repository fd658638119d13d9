//! One bounded reconciliation pass over an AuraInstance
//!
//! Wraps [`Engine::reconcile`] with the suspend check, spec validation, the
//! pass deadline and the conversion of errors into a `Ready=False`
//! condition. Nothing here touches the API server; the caller persists the
//! returned status.

use std::time::Duration;

use kube::runtime::controller::Action;
use tracing::{debug, warn};

use super::conditions::mark_ready;
use super::engine::{Engine, Outcome, Requeue};
use super::secrets::SecretStore;
use crate::aura::GatewayFactory;
use crate::crd::{AuraInstance, AuraInstanceStatus};
use crate::error::{Error, Result};

pub const FAILURE_REASON: &str = "ReconciliationFailed";

#[derive(Debug)]
pub enum PassOutcome {
    /// `spec.suspend` is set; nothing was called and nothing is written
    Suspended,
    Completed {
        status: AuraInstanceStatus,
        result: Result<Outcome>,
    },
}

/// Run one pass against a copy of the stored status.
///
/// Every error is reflected in the returned status as
/// `Ready=False/ReconciliationFailed` with the error text as message, and
/// also handed back in `result` so the caller can pick a retry schedule.
pub async fn run_pass(
    instance: &AuraInstance,
    secrets: &dyn SecretStore,
    gateways: &dyn GatewayFactory,
    default_timeout: Duration,
) -> PassOutcome {
    if instance.spec.suspend {
        debug!("AuraInstance is suspended, skipping");
        return PassOutcome::Suspended;
    }

    let mut status = instance.status.clone().unwrap_or_default();
    status.migrate_connection_uri();
    let result = execute(instance, secrets, gateways, default_timeout, &mut status).await;

    let generation = instance.metadata.generation;
    if let Err(err) = &result {
        warn!(error = %err, kind = err.kind(), "Reconciliation pass failed");
        mark_ready(&mut status, false, FAILURE_REASON, &err.to_string(), generation);
    }
    status.observed_generation = generation;

    PassOutcome::Completed { status, result }
}

async fn execute(
    instance: &AuraInstance,
    secrets: &dyn SecretStore,
    gateways: &dyn GatewayFactory,
    default_timeout: Duration,
    status: &mut AuraInstanceStatus,
) -> Result<Outcome> {
    instance.spec.validate().map_err(Error::ValidationError)?;
    let timeout = instance
        .spec
        .timeout_duration()
        .map_err(Error::ValidationError)?
        .unwrap_or(default_timeout);

    let engine = Engine::new(secrets, gateways, timeout);
    tokio::time::timeout(timeout, engine.reconcile(instance, status))
        .await
        .map_err(|_| Error::Timeout(timeout))?
}

/// Map a successful pass onto the framework's requeue action.
///
/// `Requeue::Default` uses the record's interval when it declares one.
pub fn next_action(instance: &AuraInstance, requeue: Requeue, resync: Duration) -> Action {
    match requeue {
        Requeue::Immediate => Action::requeue(Duration::ZERO),
        Requeue::After(delay) => Action::requeue(delay),
        Requeue::Default => {
            let interval = instance
                .spec
                .interval_duration()
                .ok()
                .flatten()
                .filter(|interval| !interval.is_zero());
            Action::requeue(interval.unwrap_or(resync))
        }
    }
}
