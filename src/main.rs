//! Aura Operator Entry Point
//!
//! Starts the AuraInstance controller.

use std::sync::Arc;

use clap::Parser;
use neo4j_aura_operator::config::OperatorConfig;
use neo4j_aura_operator::{controller, Error};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = OperatorConfig::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let fmt_layer = if config.log_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    // Only enable OTEL if an endpoint is provided
    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if otel_enabled {
        let otel_layer = neo4j_aura_operator::telemetry::init_telemetry(&registry)?;
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("GIT_SHA"),
        build_date = env!("BUILD_DATE"),
        "Starting Aura operator"
    );

    let client = kube::Client::try_default().await.map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState::new(client, config)?);

    let result = controller::run_controller(state).await;

    // Flush any remaining traces
    neo4j_aura_operator::telemetry::shutdown_telemetry();

    result
}
