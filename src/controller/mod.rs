//! Controller module for AuraInstance reconciliation
//!
//! This module contains the reconciliation engine, the helpers it relies on
//! (credentials, connection Secret, conditions) and the kube-rs controller
//! loop that drives it.

mod backoff;
pub mod conditions;
mod connection;
mod credentials;
mod engine;
mod pass;
mod reconciler;
mod secrets;
mod status;

pub use backoff::{calculate_backoff, Backoff};
pub use connection::{
    build_connection_secret, delete_connection_secret, owner_reference, CONNECTION_URL_KEY,
    PASSWORD_KEY, USERNAME_KEY,
};
pub use credentials::resolve_credentials;
pub use engine::{detect_drift, find_by_name, Engine, Outcome, Requeue, PROVISIONING_REQUEUE};
pub use pass::{next_action, run_pass, PassOutcome, FAILURE_REASON};
pub use reconciler::{run_controller, ControllerState};
pub use secrets::{KubeSecretStore, SecretStore};
pub use status::{patch_status, status_patch, FIELD_MANAGER};
