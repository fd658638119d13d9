//! Process configuration for the operator

use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::crd::parse_duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "aura-operator")]
#[command(version, about = "Keeps Neo4j Aura instances converged with AuraInstance resources")]
pub struct OperatorConfig {
    /// Base URL of the Aura API
    #[arg(long, env = "AURA_BASE_URL", default_value = "https://api.neo4j.io/v1")]
    pub base_url: String,

    /// OAuth2 token endpoint used for the client-credentials exchange
    #[arg(
        long,
        env = "AURA_TOKEN_URL",
        default_value = "https://api.neo4j.io/oauth/token"
    )]
    pub token_url: String,

    /// Maximum number of AuraInstances reconciled at the same time
    #[arg(long, env = "CONCURRENT", default_value_t = 4)]
    pub concurrent: u16,

    /// Default deadline of one pass and its upstream requests
    #[arg(long, default_value = "1m", value_parser = duration)]
    pub timeout: Duration,

    /// Delay before re-evaluating a healthy instance without an explicit interval
    #[arg(long, default_value = "10m", value_parser = duration)]
    pub resync_interval: Duration,

    #[arg(long, default_value = "750ms", value_parser = duration)]
    pub min_retry_delay: Duration,

    #[arg(long, default_value = "15m", value_parser = duration)]
    pub max_retry_delay: Duration,

    /// Watch AuraInstances in every namespace instead of RUNTIME_NAMESPACE only
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub watch_all_namespaces: bool,

    /// Namespace watched when --watch-all-namespaces=false
    #[arg(long, env = "RUNTIME_NAMESPACE", default_value = "default")]
    pub runtime_namespace: String,

    /// Only reconcile AuraInstances matching this label selector
    #[arg(long)]
    pub watch_label_selector: Option<String>,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

fn duration(value: &str) -> Result<Duration, String> {
    parse_duration(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OperatorConfig::try_parse_from(["aura-operator"]).expect("defaults parse");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.resync_interval, Duration::from_secs(600));
        assert_eq!(config.min_retry_delay, Duration::from_millis(750));
        assert_eq!(config.max_retry_delay, Duration::from_secs(900));
        assert!(config.watch_all_namespaces);
        assert!(config.watch_label_selector.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = OperatorConfig::try_parse_from([
            "aura-operator",
            "--timeout",
            "30s",
            "--watch-all-namespaces=false",
            "--runtime-namespace",
            "databases",
            "--watch-label-selector",
            "team=graph",
            "--concurrent",
            "8",
        ])
        .expect("flags parse");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!config.watch_all_namespaces);
        assert_eq!(config.runtime_namespace, "databases");
        assert_eq!(config.watch_label_selector.as_deref(), Some("team=graph"));
        assert_eq!(config.concurrent, 8);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        assert!(OperatorConfig::try_parse_from(["aura-operator", "--timeout", "later"]).is_err());
    }
}
