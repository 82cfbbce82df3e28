//! Relay server entry point.
//!
//! Configuration comes from the environment: `OLLAMA_BASE_URL`, `PORT`,
//! `RELAY_BIND`, `RELAY_REQUEST_TIMEOUT_SECS` for the relay and
//! `RELAY_LOG_LEVEL`, `RELAY_LOG_FORMAT`, `RELAY_LOG_FILE` for logging.

use ollama_relay::{RelayConfig, gateway, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = telemetry::init_from_env()?;

    let config = RelayConfig::from_env()?;
    tracing::info!(
        backend = %config.backend_url,
        bind = %config.bind_addr,
        request_timeout = ?config.request_timeout,
        "starting ollama relay"
    );

    if let Err(e) = gateway::serve(config).await {
        tracing::error!(error = %e, "relay terminated");
        return Err(e.into());
    }
    Ok(())
}
