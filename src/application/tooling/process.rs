use super::error::ToolInvokeError;
use super::interface::{ToolDescriptor, ToolSession};
use crate::config::ToolHostConfig;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, warn};

const PROTOCOL_VERSION: &str = "2025-06-18";

/// One MCP session over the stdio of a spawned tool-host process.
///
/// The host is spawned once, the initialize handshake runs, and the tool
/// catalogue is fetched a single time; the catalogue stays fixed for the
/// lifetime of the session.
#[derive(Clone)]
pub struct McpSession {
    inner: Arc<McpSessionInner>,
}

struct McpSessionInner {
    host: ToolHostConfig,
    state: AsyncMutex<Option<RunningState>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    pending: AsyncMutex<HashMap<String, oneshot::Sender<Result<Value, ToolInvokeError>>>>,
    id_counter: AtomicU64,
    tools: AsyncMutex<Vec<ToolDescriptor>>,
}

struct RunningState {
    child: Child,
}

impl McpSession {
    /// Spawns the tool host and runs the MCP bootstrap sequence
    /// (initialize, initialized notification, tools/list).
    pub async fn connect(host: ToolHostConfig) -> Result<Self, ToolInvokeError> {
        let session = Self {
            inner: Arc::new(McpSessionInner {
                host,
                state: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                pending: AsyncMutex::new(HashMap::new()),
                id_counter: AtomicU64::new(1),
                tools: AsyncMutex::new(Vec::new()),
            }),
        };
        session.inner.ensure_running().await?;
        Ok(session)
    }

    /// Kills the tool-host process and fails any in-flight requests.
    /// Safe to call on every exit path, including after a transport error.
    pub async fn shutdown(&self) {
        self.inner.reset().await;
    }
}

#[async_trait]
impl ToolSession for McpSession {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.inner.tools.lock().await.clone()
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolInvokeError> {
        self.inner.call_tool(tool, arguments).await
    }
}

impl McpSessionInner {
    async fn ensure_running(self: &Arc<Self>) -> Result<(), ToolInvokeError> {
        {
            let state = self.state.lock().await;
            if state.is_some() {
                return Ok(());
            }
        }

        let mut command = Command::new(&self.host.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &self.host.workdir {
            command.current_dir(dir);
        }
        if !self.host.args.is_empty() {
            command.args(&self.host.args);
        }
        for (key, value) in &self.host.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| ToolInvokeError::Spawn {
            host: self.host.label().to_string(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.transport_error("failed to capture tool host stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| self.transport_error("failed to capture tool host stdout"))?;

        {
            let mut writer = self.writer.lock().await;
            *writer = Some(BufWriter::new(stdin));
        }

        {
            let mut state = self.state.lock().await;
            *state = Some(RunningState { child });
        }

        let reader_self = Arc::clone(self);
        tokio::spawn(async move {
            reader_self.reader_loop(stdout).await;
        });

        match self.initialize_sequence().await {
            Ok(_) => Ok(()),
            Err(err) => {
                self.reset().await;
                Err(err)
            }
        }
    }

    async fn initialize_sequence(self: &Arc<Self>) -> Result<(), ToolInvokeError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": {}
        });
        self.send_request("initialize", params).await?;
        self.send_notification("notifications/initialized", json!({}))
            .await?;

        let result = self.send_request("tools/list", json!({})).await?;
        self.populate_tools(result).await;
        Ok(())
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> Result<Value, ToolInvokeError> {
        let params = json!({
            "name": tool,
            "arguments": match arguments {
                Value::Null => Value::Object(Default::default()),
                other => other,
            }
        });
        self.send_request("tools/call", params).await
    }

    async fn reader_loop(self: Arc<Self>, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(item) = lines.next_line().await {
            match item {
                Some(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('\u{1b}') {
                        debug!(
                            host = %self.host.label(),
                            line = trimmed,
                            "skipping non-JSON ANSI log line from tool host"
                        );
                        continue;
                    }
                    match serde_json::from_str::<Value>(&raw) {
                        Ok(value) => self.process_inbound_message(value).await,
                        Err(source) => {
                            warn!(
                                host = %self.host.label(),
                                line = raw,
                                %source,
                                "received invalid JSON from tool host"
                            );
                        }
                    }
                }
                None => break,
            }
        }

        self.reset().await;
    }

    async fn process_inbound_message(&self, value: Value) {
        if let Some(id) = value.get("id").cloned() {
            if value.get("method").is_some() {
                self.handle_host_request(id, value).await;
            } else {
                self.handle_response(id, value).await;
            }
        } else if value.get("method").is_some() {
            self.handle_notification(value).await;
        }
    }

    async fn handle_response(&self, id: Value, value: Value) {
        let key = match response_key(&id) {
            Some(key) => key,
            None => return,
        };

        let responder = {
            let mut pending = self.pending.lock().await;
            pending.remove(&key)
        };

        let Some(sender) = responder else {
            debug!(
                host = %self.host.label(),
                response_id = key,
                "received response for unknown request"
            );
            return;
        };

        if value.get("error").is_some() {
            let error = value.get("error").and_then(Value::as_object).map(|err| {
                (
                    err.get("code").and_then(Value::as_i64).unwrap_or(-32000),
                    err.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                )
            });
            let rpc_error = match error {
                Some((code, message)) => ToolInvokeError::Rpc {
                    host: self.host.label().to_string(),
                    code,
                    message,
                },
                None => self.transport_error("missing error payload in response"),
            };
            let _ = sender.send(Err(rpc_error));
        } else {
            let _ = sender.send(Ok(value));
        }
    }

    async fn handle_host_request(&self, id: Value, value: Value) {
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let outcome = match method {
            "ping" => self.send_response(id, json!({ "ok": true })).await,
            other => {
                warn!(
                    host = %self.host.label(),
                    method = other,
                    "tool host sent unsupported request"
                );
                let error = json!({
                    "code": -32601,
                    "message": format!("client does not implement method '{other}'"),
                });
                self.send_error(id, error).await
            }
        };
        if let Err(err) = outcome {
            warn!(host = %self.host.label(), %err, "failed to answer tool host request");
        }
    }

    async fn handle_notification(&self, value: Value) {
        if let Some(method) = value.get("method").and_then(Value::as_str) {
            // The catalogue is fixed per session; list_changed is noted but
            // not acted on.
            debug!(
                host = %self.host.label(),
                method,
                "received notification from tool host"
            );
        }
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, ToolInvokeError> {
        let id = self.next_id();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        self.write_message(&payload).await?;

        match rx.await {
            Ok(Ok(value)) => {
                let result = value.get("result").cloned().unwrap_or(Value::Null);
                Ok(result)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ToolInvokeError::Cancelled {
                host: self.host.label().to_string(),
            }),
        }
    }

    async fn send_notification(&self, method: &str, params: Value) -> Result<(), ToolInvokeError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        self.write_message(&payload).await
    }

    async fn send_response(&self, id: Value, result: Value) -> Result<(), ToolInvokeError> {
        let mut payload = json!({
            "jsonrpc": "2.0",
            "result": result
        });
        if let Value::Object(ref mut map) = payload {
            map.insert("id".to_string(), id);
        }
        self.write_message(&payload).await
    }

    async fn send_error(&self, id: Value, error: Value) -> Result<(), ToolInvokeError> {
        let mut payload = json!({
            "jsonrpc": "2.0",
            "error": error
        });
        if let Value::Object(ref mut map) = payload {
            map.insert("id".to_string(), id);
        }
        self.write_message(&payload).await
    }

    async fn write_message(&self, message: &Value) -> Result<(), ToolInvokeError> {
        let encoded =
            serde_json::to_string(message).map_err(|source| ToolInvokeError::InvalidJson {
                host: self.host.label().to_string(),
                source,
            })?;

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| self.transport_error("writer not initialised"))?;
        stream
            .write_all(encoded.as_bytes())
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|source| self.transport_error(source.to_string()))?;
        Ok(())
    }

    async fn reset(&self) {
        {
            let mut writer = self.writer.lock().await;
            *writer = None;
        }

        let mut state = self.state.lock().await;
        if let Some(mut running) = state.take() {
            if let Err(err) = running.child.kill().await {
                debug!(
                    host = %self.host.label(),
                    %err,
                    "failed to kill tool host process (may have already exited)"
                );
            }
            let _ = running.child.wait().await;
        }
        drop(state);

        self.fail_all_pending().await;
        self.tools.lock().await.clear();
    }

    async fn fail_all_pending(&self) {
        let mut pending = self.pending.lock().await;
        for (_, sender) in pending.drain() {
            let _ = sender.send(Err(ToolInvokeError::Terminated {
                host: self.host.label().to_string(),
            }));
        }
    }

    async fn populate_tools(&self, result: Value) {
        let Some(array) = result.get("tools").and_then(Value::as_array) else {
            return;
        };
        let mut tools = self.tools.lock().await;
        tools.clear();
        for tool in array {
            if let Some(name) = tool.get("name").and_then(Value::as_str) {
                let description = tool
                    .get("description")
                    .and_then(Value::as_str)
                    .map(|text| text.to_string());
                let schema = tool.get("inputSchema").cloned();
                tools.push(ToolDescriptor {
                    name: name.to_string(),
                    description,
                    input_schema: schema,
                });
            }
        }
    }

    fn next_id(&self) -> String {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        format!("req-{id}")
    }

    fn transport_error(&self, message: impl Into<String>) -> ToolInvokeError {
        ToolInvokeError::Transport {
            host: self.host.label().to_string(),
            message: message.into(),
        }
    }
}

fn response_key(id: &Value) -> Option<String> {
    match id {
        Value::String(value) => Some(value.clone()),
        Value::Number(num) => Some(num.to_string()),
        _ => None,
    }
}
