//! Minimal provider embedding: register, heartbeat a few times, deregister.
//!
//! Expects a control plane listening on 127.0.0.1:8090 (override with
//! POLARIS_ADDRESS).

use std::time::Duration;

use polaris_client::ProviderApi;
use polaris_core::{InstanceDeregisterRequest, InstanceHeartbeatRequest, InstanceRegisterRequest};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let address =
        std::env::var("POLARIS_ADDRESS").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
    let config = format!(
        r#"
global:
  api:
    timeout: 1000
    maxRetryTimes: 3
    retryInterval: 100
  serverConnector:
    addresses: ["{address}"]
"#
    );
    let provider = ProviderApi::from_yaml(&config)?;

    let register = InstanceRegisterRequest::new("default", "demo", "demo-token", "127.0.0.1", 9090)
        .with_weight(100)
        .with_metadata("env", "dev")
        .with_ttl(5);
    let instance_id = provider.register(&register).await?;
    info!(instance_id, "registered");

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let heartbeat =
            InstanceHeartbeatRequest::with_instance_id("default", "demo", "demo-token", &instance_id);
        match provider.heartbeat(&heartbeat).await {
            Ok(()) => info!(instance_id, "heartbeat ok"),
            Err(e) => warn!(error = %e, "heartbeat failed"),
        }
    }

    let deregister =
        InstanceDeregisterRequest::with_instance_id("default", "demo", "demo-token", &instance_id);
    provider.deregister(&deregister).await?;
    info!(instance_id, "deregistered");

    provider.context().shutdown().await;
    Ok(())
}
