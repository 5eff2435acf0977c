//! Default control-plane connector
//!
//! Speaks the control plane's REST naming surface with JSON bodies over
//! plain HTTP/1.1, one connection per request. Addresses are tried
//! round-robin across calls. Every operation runs inside the caller's
//! timeout budget; transport faults and timeouts classify as retryable
//! `NetworkFailed`, 5xx responses as retryable `ServerError`, and body
//! codes map onto the terminal taxonomy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_TYPE, HOST};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use polaris_core::{
    ClientError, InstanceDeregisterRequest, InstanceHeartbeatRequest, InstanceRegisterRequest,
    Plugin, PluginInstance, Result, ServerConnector,
};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ServerConnectorConfig;

const REGISTER_PATH: &str = "/naming/v1/instances";
const DEREGISTER_PATH: &str = "/naming/v1/instances/delete";
const HEARTBEAT_PATH: &str = "/v1/Heartbeat";

/// Server execution code for success
const SERVER_CODE_OK: u32 = 200_000;

pub(crate) fn http_server_connector() -> PluginInstance {
    PluginInstance::ServerConnector(std::sync::Arc::new(HttpServerConnector::from_config(
        &ServerConnectorConfig::default(),
    )))
}

/// REST connector to the control plane's naming surface
pub struct HttpServerConnector {
    addresses: Vec<String>,
    next: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct NamingResponse {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    info: String,
    instance: Option<NamingInstance>,
}

#[derive(Debug, Deserialize)]
struct NamingInstance {
    #[serde(default)]
    id: String,
}

impl HttpServerConnector {
    /// Create a connector talking to the given `host:port` addresses
    pub fn new(addresses: Vec<String>) -> Self {
        Self {
            addresses,
            next: AtomicUsize::new(0),
        }
    }

    /// Create a connector from the connector config section
    pub fn from_config(config: &ServerConnectorConfig) -> Self {
        Self::new(config.addresses.clone())
    }

    fn pick_address(&self) -> Result<&str> {
        if self.addresses.is_empty() {
            return Err(ClientError::NetworkFailed(
                "no control plane address configured".to_string(),
            ));
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.addresses.len();
        Ok(&self.addresses[index])
    }

    async fn post_json(
        &self,
        path: &str,
        body: serde_json::Value,
        timeout: Duration,
    ) -> Result<NamingResponse> {
        let address = self.pick_address()?.to_string();
        let exchange = async {
            let stream = TcpStream::connect(&address).await.map_err(|e| {
                ClientError::NetworkFailed(format!("connect {address}: {e}"))
            })?;
            let (mut sender, connection) =
                hyper::client::conn::http1::handshake(TokioIo::new(stream))
                    .await
                    .map_err(|e| {
                        ClientError::NetworkFailed(format!("handshake {address}: {e}"))
                    })?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    debug!(error = %e, "connector connection closed with error");
                }
            });

            let payload = serde_json::to_vec(&body)
                .map_err(|e| ClientError::Unknown(format!("encode request: {e}")))?;
            let request = Request::builder()
                .method(Method::POST)
                .uri(path)
                .header(HOST, &address)
                .header(CONTENT_TYPE, "application/json")
                .body(Full::new(Bytes::from(payload)))
                .map_err(|e| ClientError::Unknown(format!("build request: {e}")))?;

            let response = sender.send_request(request).await.map_err(|e| {
                ClientError::NetworkFailed(format!("send {path} to {address}: {e}"))
            })?;
            let status = response.status();
            if status.is_server_error() {
                return Err(ClientError::ServerError(format!(
                    "control plane returned {status}"
                )));
            }

            let bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ClientError::NetworkFailed(format!("read response: {e}")))?
                .to_bytes();
            parse_naming_response(status, &bytes)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::NetworkFailed(format!(
                "request to {address} timed out after {timeout:?}"
            ))),
        }
    }
}

fn parse_naming_response(status: StatusCode, bytes: &[u8]) -> Result<NamingResponse> {
    let response: NamingResponse = serde_json::from_slice(bytes).map_err(|e| {
        ClientError::Unknown(format!("malformed naming response ({status}): {e}"))
    })?;
    check_server_code(response.code, &response.info)?;
    Ok(response)
}

/// Map the server's execution code onto the client taxonomy
fn check_server_code(code: u32, info: &str) -> Result<()> {
    match code {
        SERVER_CODE_OK => Ok(()),
        400_201 => Err(ClientError::ExistedResource(info.to_string())),
        400_202 | 400_902 => Err(ClientError::InstanceNotFound(info.to_string())),
        401_000 | 401_001 => Err(ClientError::Unauthorized(info.to_string())),
        429_001 | 429_002 => Err(ClientError::RateLimit(info.to_string())),
        500_000..=599_999 => Err(ClientError::ServerError(format!("{code}: {info}"))),
        other => Err(ClientError::Unknown(format!("{other}: {info}"))),
    }
}

impl Plugin for HttpServerConnector {
    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl ServerConnector for HttpServerConnector {
    async fn register_instance(
        &self,
        req: &InstanceRegisterRequest,
        timeout: Duration,
    ) -> Result<String> {
        let mut body = json!({
            "namespace": req.service_namespace,
            "service": req.service_name,
            "service_token": req.service_token,
            "host": req.host,
            "port": req.port,
            "metadata": req.metadata,
        });
        if let Some(weight) = req.weight {
            body["weight"] = json!(weight);
        }
        if let Some(ttl) = req.ttl_seconds {
            body["health_check"] = json!({ "type": 1, "heartbeat": { "ttl": ttl } });
        }

        let response = self.post_json(REGISTER_PATH, body, timeout).await?;
        match response.instance {
            Some(instance) if !instance.id.is_empty() => Ok(instance.id),
            _ => Err(ClientError::ServerError(
                "register response carries no instance id".to_string(),
            )),
        }
    }

    async fn deregister_instance(
        &self,
        req: &InstanceDeregisterRequest,
        timeout: Duration,
    ) -> Result<()> {
        let body = match &req.instance_id {
            Some(id) => json!({
                "id": id,
                "service_token": req.service_token,
            }),
            None => json!({
                "namespace": req.service_namespace,
                "service": req.service_name,
                "service_token": req.service_token,
                "host": req.host,
                "port": req.port,
            }),
        };
        self.post_json(DEREGISTER_PATH, body, timeout).await?;
        Ok(())
    }

    async fn instance_heartbeat(
        &self,
        req: &InstanceHeartbeatRequest,
        timeout: Duration,
    ) -> Result<()> {
        let body = match &req.instance_id {
            Some(id) => json!({
                "id": id,
                "service_token": req.service_token,
            }),
            None => json!({
                "namespace": req.service_namespace,
                "service": req.service_name,
                "service_token": req.service_token,
                "host": req.host,
                "port": req.port,
            }),
        };
        self.post_json(HEARTBEAT_PATH, body, timeout).await?;
        Ok(())
    }
}
