//! Active health probes
//!
//! Each detector answers one question: did the instance respond to a probe
//! within the probe timeout. A connect refusal, probe timeout, or bad
//! response is an unhealthy verdict, not an error; `Err` is reserved for
//! probes that could not run at all.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use polaris_core::{DetectResult, Instance, OutlierDetector, Plugin, PluginInstance, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout, Instant};
use tracing::debug;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

pub(crate) fn tcp_detector() -> PluginInstance {
    PluginInstance::OutlierDetector(Arc::new(TcpOutlierDetector::default()))
}

pub(crate) fn http_detector() -> PluginInstance {
    PluginInstance::OutlierDetector(Arc::new(HttpOutlierDetector::default()))
}

pub(crate) fn udp_detector() -> PluginInstance {
    PluginInstance::OutlierDetector(Arc::new(UdpOutlierDetector::default()))
}

/// Probe by TCP connect
pub struct TcpOutlierDetector {
    probe_timeout: Duration,
}

impl TcpOutlierDetector {
    /// Detector with a custom probe timeout
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }
}

impl Default for TcpOutlierDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Plugin for TcpOutlierDetector {
    fn name(&self) -> &'static str {
        "tcp"
    }
}

#[async_trait]
impl OutlierDetector for TcpOutlierDetector {
    async fn detect_instance(&self, instance: &Instance) -> Result<DetectResult> {
        let begin = Instant::now();
        let healthy = matches!(
            timeout(self.probe_timeout, TcpStream::connect(instance.endpoint())).await,
            Ok(Ok(_))
        );
        if !healthy {
            debug!(endpoint = %instance.endpoint(), "tcp probe failed");
        }
        Ok(DetectResult {
            healthy,
            elapsed: begin.elapsed(),
        })
    }
}

/// Probe by HTTP GET on a health path
pub struct HttpOutlierDetector {
    probe_timeout: Duration,
    path: String,
}

impl HttpOutlierDetector {
    /// Detector with a custom timeout and health path
    pub fn new(probe_timeout: Duration, path: impl Into<String>) -> Self {
        Self {
            probe_timeout,
            path: path.into(),
        }
    }

    async fn probe(&self, instance: &Instance) -> bool {
        let exchange = async {
            let mut stream = TcpStream::connect(instance.endpoint()).await.ok()?;
            let request = format!(
                "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
                self.path,
                instance.endpoint()
            );
            stream.write_all(request.as_bytes()).await.ok()?;

            let mut buf = [0u8; 64];
            let read = stream.read(&mut buf).await.ok()?;
            let head = String::from_utf8_lossy(&buf[..read]);
            // Any 2xx status line counts as alive.
            Some(head.starts_with("HTTP/1.1 2") || head.starts_with("HTTP/1.0 2"))
        };
        matches!(timeout(self.probe_timeout, exchange).await, Ok(Some(true)))
    }
}

impl Default for HttpOutlierDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT, "/health")
    }
}

impl Plugin for HttpOutlierDetector {
    fn name(&self) -> &'static str {
        "http"
    }
}

#[async_trait]
impl OutlierDetector for HttpOutlierDetector {
    async fn detect_instance(&self, instance: &Instance) -> Result<DetectResult> {
        let begin = Instant::now();
        let healthy = self.probe(instance).await;
        if !healthy {
            debug!(endpoint = %instance.endpoint(), "http probe failed");
        }
        Ok(DetectResult {
            healthy,
            elapsed: begin.elapsed(),
        })
    }
}

/// Probe by UDP echo
pub struct UdpOutlierDetector {
    probe_timeout: Duration,
}

impl UdpOutlierDetector {
    /// Detector with a custom probe timeout
    pub fn new(probe_timeout: Duration) -> Self {
        Self { probe_timeout }
    }

    async fn probe(&self, instance: &Instance) -> bool {
        let exchange = async {
            let socket = UdpSocket::bind("0.0.0.0:0").await.ok()?;
            socket.connect(instance.endpoint()).await.ok()?;
            socket.send(b"polaris-detect-ping").await.ok()?;
            let mut buf = [0u8; 32];
            let received = socket.recv(&mut buf).await.ok()?;
            Some(received > 0)
        };
        matches!(timeout(self.probe_timeout, exchange).await, Ok(Some(true)))
    }
}

impl Default for UdpOutlierDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Plugin for UdpOutlierDetector {
    fn name(&self) -> &'static str {
        "udp"
    }
}

#[async_trait]
impl OutlierDetector for UdpOutlierDetector {
    async fn detect_instance(&self, instance: &Instance) -> Result<DetectResult> {
        let begin = Instant::now();
        let healthy = self.probe(instance).await;
        if !healthy {
            debug!(endpoint = %instance.endpoint(), "udp probe failed");
        }
        Ok(DetectResult {
            healthy,
            elapsed: begin.elapsed(),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn instance_at(addr: &std::net::SocketAddr) -> Instance {
        Instance::new("probe-target", addr.ip().to_string(), addr.port())
    }

    #[tokio::test]
    async fn tcp_probe_reports_listening_instance_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((_stream, _)) = listener.accept().await else {
                    break;
                };
            }
        });

        let detector = TcpOutlierDetector::default();
        let result = detector.detect_instance(&instance_at(&addr)).await.unwrap();
        assert!(result.healthy);
    }

    #[tokio::test]
    async fn tcp_probe_reports_closed_port_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let detector = TcpOutlierDetector::default();
        let result = detector.detect_instance(&instance_at(&addr)).await.unwrap();
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn http_probe_requires_2xx_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 512];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                        .await;
                });
            }
        });

        let detector = HttpOutlierDetector::default();
        let result = detector.detect_instance(&instance_at(&addr)).await.unwrap();
        assert!(result.healthy);
    }

    #[tokio::test]
    async fn http_probe_treats_5xx_as_unhealthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 512];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream
                        .write_all(b"HTTP/1.1 503 Service Unavailable\r\n\r\n")
                        .await;
                });
            }
        });

        let detector = HttpOutlierDetector::default();
        let result = detector.detect_instance(&instance_at(&addr)).await.unwrap();
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn udp_probe_reports_echoing_instance_healthy() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..len], peer).await;
            }
        });

        let detector = UdpOutlierDetector::default();
        let result = detector.detect_instance(&instance_at(&addr)).await.unwrap();
        assert!(result.healthy);
    }

    #[tokio::test]
    async fn udp_probe_times_out_without_echo() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        // Keep the socket alive but never answer.
        let _silent = socket;

        let detector = UdpOutlierDetector::new(Duration::from_millis(100));
        let result = detector.detect_instance(&instance_at(&addr)).await.unwrap();
        assert!(!result.healthy);
    }
}
