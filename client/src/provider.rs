//! Provider API
//!
//! The caller-facing surface for registering a workload with the control
//! plane, refreshing its liveness, and deregistering it. All three
//! operations share one bounded-retry algorithm: a monotonic budget that
//! starts at the request timeout (or the configured default), at most
//! `api.maxRetryTimes` attempts, and an inter-attempt sleep capped by both
//! `api.retryInterval` and the remaining budget. Only transport and
//! transient server faults retry; every other outcome is terminal.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use polaris_core::{
    ApiKind, ClientError, InstanceDeregisterRequest, InstanceHeartbeatRequest,
    InstanceRegisterRequest, Result, ReturnCode,
};
use tokio::time::{sleep, Instant};
use tracing::{debug, error};

use crate::api_stat::ApiStat;
use crate::config::ClientConfig;
use crate::context::{Context, ContextMode};

/// Caller-facing provider surface; thread-safe, call from any task
pub struct ProviderApi {
    context: Arc<Context>,
}

impl ProviderApi {
    /// Wrap an existing context
    pub fn new(context: Arc<Context>) -> Self {
        Self { context }
    }

    /// Build a private context from a config and wrap it
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        match Context::new(config, ContextMode::Private) {
            Ok(context) => Ok(Self { context }),
            Err(e) => {
                error!(error = %e, "failed to create provider api from config");
                Err(e)
            }
        }
    }

    /// Build from YAML config content
    pub fn from_yaml(content: &str) -> Result<Self> {
        Self::from_config(ClientConfig::from_yaml(content).inspect_err(
            |e| error!(error = %e, "failed to parse provider config"),
        )?)
    }

    /// Build from a YAML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_config(ClientConfig::from_file(path).inspect_err(
            |e| error!(error = %e, "failed to load provider config file"),
        )?)
    }

    /// Build from the environment's default config file
    pub fn with_default_file() -> Result<Self> {
        Self::from_config(ClientConfig::with_default_file().inspect_err(
            |e| error!(error = %e, "failed to load default provider config"),
        )?)
    }

    /// The context backing this API
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Register the calling process as a service instance
    ///
    /// Returns the control-plane assigned instance id.
    pub async fn register(&self, req: &InstanceRegisterRequest) -> Result<String> {
        let stat = ApiStat::new(&self.context, ApiKind::ProviderRegister);
        if let Err(e) = validate_register(req) {
            error!(error = %e, "register instance rejected");
            stat.record(e.code());
            return Err(e);
        }

        let connector = self.context.server_connector();
        let result = run_with_retry(&self.context, req.timeout, |budget| {
            connector.register_instance(req, budget)
        })
        .await;
        stat.record(result_code(&result));
        result
    }

    /// Remove a previously registered instance
    pub async fn deregister(&self, req: &InstanceDeregisterRequest) -> Result<()> {
        let stat = ApiStat::new(&self.context, ApiKind::ProviderDeregister);
        if let Err(e) = validate_endpoint_or_id(
            &req.service_namespace,
            &req.service_name,
            &req.service_token,
            req.instance_id.as_deref(),
            &req.host,
            req.port,
        ) {
            error!(error = %e, "deregister instance rejected");
            stat.record(e.code());
            return Err(e);
        }

        let connector = self.context.server_connector();
        let result = run_with_retry(&self.context, req.timeout, |budget| {
            connector.deregister_instance(req, budget)
        })
        .await;
        stat.record(result_code(&result));
        result
    }

    /// Refresh the liveness of a registered instance
    pub async fn heartbeat(&self, req: &InstanceHeartbeatRequest) -> Result<()> {
        let stat = ApiStat::new(&self.context, ApiKind::ProviderHeartbeat);
        if let Err(e) = validate_endpoint_or_id(
            &req.service_namespace,
            &req.service_name,
            &req.service_token,
            req.instance_id.as_deref(),
            &req.host,
            req.port,
        ) {
            error!(error = %e, "instance heartbeat rejected");
            stat.record(e.code());
            return Err(e);
        }

        let connector = self.context.server_connector();
        let result = run_with_retry(&self.context, req.timeout, |budget| {
            connector.instance_heartbeat(req, budget)
        })
        .await;
        stat.record(result_code(&result));
        result
    }
}

fn result_code<T>(result: &Result<T>) -> ReturnCode {
    match result {
        Ok(_) => ReturnCode::Ok,
        Err(e) => e.code(),
    }
}

fn validate_register(req: &InstanceRegisterRequest) -> Result<()> {
    validate_endpoint(
        &req.service_namespace,
        &req.service_name,
        &req.service_token,
        &req.host,
        req.port,
    )
}

fn validate_endpoint(
    namespace: &str,
    name: &str,
    token: &str,
    host: &str,
    port: u16,
) -> Result<()> {
    if namespace.is_empty() {
        return Err(ClientError::InvalidArgument(
            "service namespace is empty".to_string(),
        ));
    }
    if name.is_empty() {
        return Err(ClientError::InvalidArgument(
            "service name is empty".to_string(),
        ));
    }
    if token.is_empty() {
        return Err(ClientError::InvalidArgument(
            "service token is empty".to_string(),
        ));
    }
    if host.is_empty() {
        return Err(ClientError::InvalidArgument(
            "instance host is empty".to_string(),
        ));
    }
    if port == 0 {
        return Err(ClientError::InvalidArgument(
            "instance port must be in [1, 65535]".to_string(),
        ));
    }
    Ok(())
}

fn validate_endpoint_or_id(
    namespace: &str,
    name: &str,
    token: &str,
    instance_id: Option<&str>,
    host: &str,
    port: u16,
) -> Result<()> {
    if let Some(id) = instance_id {
        if id.is_empty() {
            return Err(ClientError::InvalidArgument(
                "instance id is empty".to_string(),
            ));
        }
        if token.is_empty() {
            return Err(ClientError::InvalidArgument(
                "service token is empty".to_string(),
            ));
        }
        return Ok(());
    }
    validate_endpoint(namespace, name, token, host, port)
}

/// The shared bounded-retry algorithm
///
/// Drives `op` with the remaining budget until it returns a terminal
/// outcome, the attempt count is exhausted, or the budget runs dry. The
/// inter-attempt sleep never exceeds the remaining budget, so total wall
/// time stays within the initial budget plus one in-flight call.
async fn run_with_retry<T, F, Fut>(
    context: &Context,
    request_timeout: Option<Duration>,
    mut op: F,
) -> Result<T>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut budget = request_timeout.unwrap_or_else(|| context.api_default_timeout());
    // Config validation guarantees at least one attempt.
    let mut attempts_left = context.api_max_retry_times();
    let retry_interval = context.api_retry_interval();

    loop {
        let begin = Instant::now();
        let result = op(budget).await;
        let elapsed = begin.elapsed();

        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        attempts_left -= 1;
        if attempts_left == 0 || elapsed >= budget {
            return Err(err);
        }
        budget = budget.saturating_sub(elapsed);

        let backoff = budget.min(retry_interval);
        debug!(
            error = %err,
            backoff_ms = backoff.as_millis() as u64,
            remaining_ms = budget.as_millis() as u64,
            attempts_left,
            "retrying after transient failure"
        );
        sleep(backoff).await;
        budget = budget.saturating_sub(backoff);
        if budget.is_zero() {
            return Err(err);
        }
    }
}
