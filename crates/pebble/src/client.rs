//! Pebble client for the workload container.
//!
//! Layer, plan and service calls go to the Pebble REST API over the
//! container's unix socket. One-shot commands go through the `pebble exec`
//! CLI, which owns the stdio websockets Pebble requires for exec.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{CONTENT_TYPE, HOST};
use http::{Method, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use itertools::Itertools;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::UnixStream;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::supervisor::Supervisor;
use crate::types::{ExecOutput, Layer, Plan, ServiceInfo};

/// How long Pebble may hold a change-wait request open.
const CHANGE_WAIT_TIMEOUT: &str = "60s";

/// Response envelope shared by every Pebble endpoint.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "status-code", default)]
    status_code: u16,
    #[serde(default)]
    change: Option<String>,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ChangeInfo {
    id: String,
    status: String,
    #[serde(default)]
    ready: bool,
    #[serde(default)]
    err: Option<String>,
}

/// Client for a single Pebble instance.
#[derive(Debug, Clone)]
pub struct PebbleClient {
    socket_path: PathBuf,
    pebble_binary: PathBuf,
}

impl PebbleClient {
    /// Create a client for the given API socket and `pebble` executable.
    pub fn new(socket_path: impl Into<PathBuf>, pebble_binary: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            pebble_binary: pebble_binary.into(),
        }
    }

    /// Send one request on a fresh connection and collect the body.
    async fn send(&self, method: Method, uri: &str, body: Option<&Value>) -> Result<(StatusCode, Bytes)> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::connection_failed(format!("{}: {e}", self.socket_path.display()))
        })?;

        let (mut sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| Error::connection_failed(format!("handshake failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "Pebble connection closed with error");
            }
        });

        let payload = body.map(serde_json::to_vec).transpose()?.unwrap_or_default();

        let request = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(HOST, "localhost")
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| Error::invalid_response(format!("invalid request {uri}: {e}")))?;

        debug!(%method, uri, "Pebble request");

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| Error::connection_failed(format!("{method} {uri}: {e}")))?;

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::connection_failed(format!("reading {uri}: {e}")))?
            .to_bytes();

        Ok((status, bytes))
    }

    async fn call(&self, method: Method, uri: &str, body: Option<&Value>) -> Result<Envelope> {
        let (status, bytes) = self.send(method, uri, body).await?;
        parse_envelope(status, &bytes)
    }

    /// Block until an asynchronous change is ready.
    async fn wait_change(&self, change_id: &str) -> Result<()> {
        let uri = format!("/v1/changes/{change_id}/wait?timeout={CHANGE_WAIT_TIMEOUT}");
        let envelope = self.call(Method::GET, &uri, None).await?;
        let change: ChangeInfo = serde_json::from_value(envelope.result)?;
        check_change(change)
    }
}

#[async_trait]
impl Supervisor for PebbleClient {
    async fn can_connect(&self) -> bool {
        match self.call(Method::GET, "/v1/system-info", None).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, socket = %self.socket_path.display(), "Pebble not reachable");
                false
            }
        }
    }

    async fn get_plan(&self) -> Result<Plan> {
        let envelope = self.call(Method::GET, "/v1/plan?format=yaml", None).await?;
        let raw = envelope
            .result
            .as_str()
            .ok_or_else(|| Error::invalid_response("plan result is not a YAML string"))?;
        Plan::from_yaml(raw)
    }

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        let body = json!({
            "action": "add",
            "combine": combine,
            "label": label,
            "format": "yaml",
            "layer": layer.to_yaml()?,
        });
        self.call(Method::POST, "/v1/layers", Some(&body)).await?;
        info!(label, combine, "Layer added");
        Ok(())
    }

    async fn restart(&self, service: &str) -> Result<()> {
        let body = json!({ "action": "restart", "services": [service] });
        let envelope = self.call(Method::POST, "/v1/services", Some(&body)).await?;
        let change_id = envelope
            .change
            .ok_or_else(|| Error::invalid_response("restart did not return a change id"))?;
        self.wait_change(&change_id).await?;
        info!(service, change = %change_id, "Service restarted");
        Ok(())
    }

    async fn services(&self, names: &[&str]) -> Result<Vec<ServiceInfo>> {
        let uri = format!("/v1/services?names={}", names.iter().join(","));
        let envelope = self.call(Method::GET, &uri, None).await?;
        Ok(serde_json::from_value(envelope.result)?)
    }

    async fn exec(&self, command: &[String], timeout: Duration) -> Result<ExecOutput> {
        let rendered = command.iter().join(" ");
        info!(command = %rendered, timeout_secs = timeout.as_secs(), "Running command in workload");

        let output = Command::new(&self.pebble_binary)
            .env("PEBBLE_SOCKET", &self.socket_path)
            .arg("exec")
            .arg(format!("--timeout={}s", timeout.as_secs()))
            .arg("--")
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| Error::exec_failed(&rendered, e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(Error::ExecExited {
                command: rendered,
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(ExecOutput { stdout, stderr })
    }
}

/// Decode a Pebble response, turning error envelopes into [`Error::Api`].
fn parse_envelope(status: StatusCode, body: &[u8]) -> Result<Envelope> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| Error::invalid_response(format!("HTTP {status}: {e}")))?;

    if envelope.kind == "error" || !status.is_success() {
        let message = envelope
            .result
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let code = if envelope.status_code == 0 {
            status.as_u16()
        } else {
            envelope.status_code
        };
        return Err(Error::api(code, message));
    }

    Ok(envelope)
}

fn check_change(change: ChangeInfo) -> Result<()> {
    match change.err {
        Some(err) if !err.is_empty() => Err(Error::change_failed(change.id, err)),
        _ if !change.ready => Err(Error::change_failed(
            change.id,
            format!("change not ready (status {})", change.status),
        )),
        _ => Ok(()),
    }
}
