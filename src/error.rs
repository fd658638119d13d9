//! Error types for the Aura operator
//!
//! The `Display` output of every variant is what ends up in the `Ready`
//! condition message, so it has to name the exact field, status code or
//! owner that caused the failure.

use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The credential Secret referenced by the record does not exist.
    #[error("failed to get secret: Secret \"{0}\" not found")]
    SecretNotFound(String),

    /// The credential Secret exists but one of the configured keys is missing or empty.
    #[error("secret must contain {client_id_key} and {client_secret_key} keys")]
    InvalidCredential {
        client_id_key: String,
        client_secret_key: String,
    },

    /// The Aura API answered with a status code other than the one expected.
    #[error("failed to {action}, request failed with code {code} - {body}")]
    UpstreamRejected {
        action: &'static str,
        code: u16,
        body: String,
    },

    /// The request never produced a response (connect, TLS, timeout, decode).
    #[error("failed to {action}: {source}")]
    TransportFailure {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to obtain access token: {0}")]
    Token(String),

    #[error("reconciliation exceeded deadline of {0:?}")]
    Timeout(Duration),

    /// The remote instance was created but the connection Secret could not be stored.
    #[error("failed to create connection secret: {0}")]
    CreateFollowupFailed(String),

    /// The connection Secret is owned by something other than this record.
    #[error("failed to delete secret, owner uid {found} does not match")]
    OwnershipMismatch { secret: String, found: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl Error {
    /// Whether the pass should be retried on the backoff schedule.
    ///
    /// Terminal errors wait for the record to be edited instead.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            Error::InvalidCredential { .. } | Error::ValidationError(_)
        )
    }

    /// Short label used for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::SecretNotFound(_) => "not_found",
            Error::InvalidCredential { .. } => "invalid_credential",
            Error::UpstreamRejected { .. } => "upstream_rejected",
            Error::TransportFailure { .. } | Error::Token(_) | Error::Timeout(_) => "transport",
            Error::CreateFollowupFailed(_) => "create_followup",
            Error::OwnershipMismatch { .. } => "ownership_mismatch",
            Error::SerializationError(_) => "serialization",
            Error::ValidationError(_) => "validation",
            Error::ConfigError(_) => "config",
        }
    }
}
