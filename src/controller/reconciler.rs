//! kube-rs controller wiring for AuraInstance
//!
//! Watches AuraInstances, runs one pass per change or requeue and persists
//! the resulting status. Failed passes are retried with per-record
//! exponential backoff.

use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::{Api, ListParams},
    client::Client,
    runtime::{
        controller::{self, Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        watcher,
    },
    Resource, ResourceExt,
};
use tracing::{error, info, instrument, warn};

use super::backoff::Backoff;
use super::pass::{next_action, run_pass, PassOutcome, FAILURE_REASON};
use super::secrets::KubeSecretStore;
use super::status::{patch_status, FIELD_MANAGER};
use crate::aura::{AuraClientFactory, GatewayFactory};
use crate::config::OperatorConfig;
use crate::crd::AuraInstance;
use crate::error::{Error, Result};

/// Shared state for the AuraInstance controller
pub struct ControllerState {
    pub client: Client,
    pub config: OperatorConfig,
    /// Builds an authenticated Aura API gateway per credential set
    pub gateways: Arc<dyn GatewayFactory>,
    pub backoff: Backoff,
    pub reporter: Reporter,
}

impl ControllerState {
    pub fn new(client: Client, config: OperatorConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("aura-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("failed to build HTTP client: {e}")))?;
        let gateways = AuraClientFactory::new(http, &config.base_url, &config.token_url)?;

        Ok(Self {
            client,
            backoff: Backoff::new(config.min_retry_delay, config.max_retry_delay),
            gateways: Arc::new(gateways),
            reporter: Reporter {
                controller: FIELD_MANAGER.to_string(),
                instance: std::env::var("POD_NAME").ok(),
            },
            config,
        })
    }
}

/// Main entry point to start the AuraInstance controller
pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let config = &state.config;

    let instances: Api<AuraInstance> = if config.watch_all_namespaces {
        info!("Watching AuraInstances in all namespaces");
        Api::all(client)
    } else {
        info!("Watching AuraInstances in namespace {}", config.runtime_namespace);
        Api::namespaced(client, &config.runtime_namespace)
    };

    match instances.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("AuraInstance CRD is available"),
        Err(e) => {
            error!("AuraInstance CRD not found: {:?}", e);
            return Err(Error::ConfigError(
                "AuraInstance CRD not installed".to_string(),
            ));
        }
    }

    let mut watcher_config = watcher::Config::default();
    if let Some(selector) = &config.watch_label_selector {
        watcher_config = watcher_config.labels(selector);
    }

    info!(
        "Starting AuraInstance controller (concurrency {})",
        config.concurrent
    );

    Controller::new(instances, watcher_config)
        .with_config(controller::Config::default().concurrency(config.concurrent))
        .shutdown_on_signal()
        .run(reconcile, error_policy, state.clone())
        .for_each(|res| async move {
            match res {
                Ok((obj, _)) => info!("Reconciled AuraInstance {}", obj),
                Err(e) => warn!("Reconcile error: {}", e),
            }
        })
        .await;

    Ok(())
}

#[instrument(skip(obj, ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<AuraInstance>, ctx: Arc<ControllerState>) -> Result<Action> {
    let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
    let key = format!("{}/{}", namespace, obj.name_any());

    let secrets = KubeSecretStore::namespaced(ctx.client.clone(), &namespace);
    let (status, result) =
        match run_pass(&obj, &secrets, ctx.gateways.as_ref(), ctx.config.timeout).await {
            PassOutcome::Suspended => {
                info!("AuraInstance {} is suspended", key);
                ctx.backoff.reset(&key);
                return Ok(Action::await_change());
            }
            PassOutcome::Completed { status, result } => (status, result),
        };

    let api: Api<AuraInstance> = Api::namespaced(ctx.client.clone(), &namespace);
    let written = patch_status(&api, &obj, &status).await;

    match result {
        Ok(outcome) => {
            written?;
            ctx.backoff.reset(&key);
            if let Some(id) = &outcome.created_instance {
                publish_event(
                    &ctx,
                    &obj,
                    EventType::Normal,
                    "InstanceCreated",
                    format!("Created aura instance \"{id}\""),
                )
                .await;
            }
            Ok(next_action(&obj, outcome.requeue, ctx.config.resync_interval))
        }
        Err(err) => {
            if let Err(write_err) = written {
                warn!("Failed to record failure on {}: {}", key, write_err);
            }
            publish_event(
                &ctx,
                &obj,
                EventType::Warning,
                FAILURE_REASON,
                err.to_string(),
            )
            .await;
            Err(err)
        }
    }
}

async fn publish_event(
    ctx: &ControllerState,
    obj: &AuraInstance,
    type_: EventType,
    reason: &str,
    note: String,
) {
    let recorder = Recorder::new(ctx.client.clone(), ctx.reporter.clone(), obj.object_ref(&()));
    let event = Event {
        type_,
        reason: reason.to_string(),
        note: Some(note),
        action: "Reconcile".to_string(),
        secondary: None,
    };
    if let Err(e) = recorder.publish(event).await {
        warn!("Failed to publish {} event: {}", reason, e);
    }
}

/// Error policy for the controller
fn error_policy(obj: Arc<AuraInstance>, error: &Error, ctx: Arc<ControllerState>) -> Action {
    let key = format!(
        "{}/{}",
        obj.namespace().unwrap_or_else(|| "default".to_string()),
        obj.name_any()
    );
    retry_action(&key, error, &ctx.backoff)
}

fn retry_action(key: &str, error: &Error, backoff: &Backoff) -> Action {
    if !error.is_retriable() {
        warn!("Reconciliation of {} failed permanently: {}", key, error);
        return Action::await_change();
    }

    let delay = backoff.next_delay(key);
    error!(
        kind = error.kind(),
        "Reconciliation of {} failed, retrying in {:?}: {}", key, delay, error
    );
    Action::requeue(delay)
}
