//! Subprocess transport: newline-framed JSON-RPC over a child's stdio.

use super::rpc;
use super::{CallOutcome, ToolTransport, TransportError};
use crate::domain::types::ToolDescriptor;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tracing::{debug, trace, warn};

const CONTAINER_LAUNCHERS: &[&str] = &["docker", "podman"];

type Pending = Arc<AsyncMutex<HashMap<String, oneshot::Sender<Result<Value, TransportError>>>>>;
type SharedWriter = Arc<AsyncMutex<BufWriter<ChildStdin>>>;

pub struct StdioTransport {
    server: String,
    child: Child,
    writer: SharedWriter,
    pending: Pending,
    id_counter: AtomicU64,
}

impl StdioTransport {
    pub async fn connect(
        server: &str,
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let (argv, child_env) = env_injection(command, args, env);
        debug!(server = %server, command = %command, "spawning tool server");

        let mut cmd = Command::new(command);
        cmd.args(&argv)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // server stderr would scribble over the TUI
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in &child_env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|source| TransportError::Spawn {
            server: server.to_string(),
            source,
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| channel_error(server, "failed to capture server stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| channel_error(server, "failed to capture server stdout"))?;

        let writer: SharedWriter = Arc::new(AsyncMutex::new(BufWriter::new(stdin)));
        let pending: Pending = Arc::new(AsyncMutex::new(HashMap::new()));
        spawn_reader(
            server.to_string(),
            stdout,
            Arc::clone(&pending),
            Arc::clone(&writer),
        );

        let mut transport = Self {
            server: server.to_string(),
            child,
            writer,
            pending,
            id_counter: AtomicU64::new(1),
        };
        match transport.handshake().await {
            Ok(()) => Ok(transport),
            Err(err) => {
                transport.close().await;
                Err(err)
            }
        }
    }

    async fn handshake(&mut self) -> Result<(), TransportError> {
        self.send_request("initialize", rpc::initialize_params())
            .await?;
        write_message(
            &self.writer,
            &self.server,
            &rpc::notification("notifications/initialized", json!({})),
        )
        .await
    }

    async fn send_request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = format!("req-{}", self.id_counter.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        if let Err(err) = write_message(
            &self.writer,
            &self.server,
            &rpc::request(&id, method, params),
        )
        .await
        {
            self.pending.lock().await.remove(&id);
            return Err(err);
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TransportError::Terminated {
                server: self.server.clone(),
            }),
        }
    }
}

#[async_trait]
impl super::ToolTransport for StdioTransport {
    async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, TransportError> {
        let result = self.send_request("tools/list", json!({})).await?;
        Ok(rpc::tools_from_list(&result))
    }

    async fn call_tool(
        &mut self,
        tool: &str,
        arguments: Value,
    ) -> Result<CallOutcome, TransportError> {
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let result = self
            .send_request("tools/call", json!({"name": tool, "arguments": arguments}))
            .await?;
        Ok(rpc::call_outcome(&result))
    }

    async fn close(&mut self) {
        if let Err(err) = self.child.kill().await {
            debug!(server = %self.server, %err, "tool server already exited");
        }
        fail_pending(&self.server, &self.pending).await;
    }
}

fn spawn_reader(server: String, stdout: ChildStdout, pending: Pending, writer: SharedWriter) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(item) = lines.next_line().await {
            match item {
                Some(raw) => {
                    let trimmed = raw.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed.starts_with('\u{1b}') {
                        trace!(server = %server, "skipping terminal control output from server");
                        continue;
                    }
                    match serde_json::from_str::<Value>(trimmed) {
                        Ok(value) => route_inbound(&server, value, &pending, &writer).await,
                        Err(source) => {
                            warn!(
                                server = %server,
                                line = trimmed,
                                %source,
                                "server wrote invalid JSON on stdout"
                            );
                        }
                    }
                }
                None => break,
            }
        }
        fail_pending(&server, &pending).await;
    });
}

async fn route_inbound(server: &str, value: Value, pending: &Pending, writer: &SharedWriter) {
    let id = value.get("id").cloned();
    let has_method = value.get("method").is_some();
    match (id, has_method) {
        (Some(id), true) => answer_server_request(server, id, &value, writer).await,
        (Some(id), false) => deliver_response(server, id, value, pending).await,
        (None, true) => {
            let method = value
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or_default();
            debug!(server = %server, method, "notification from server");
        }
        (None, false) => {}
    }
}

async fn deliver_response(server: &str, id: Value, value: Value, pending: &Pending) {
    let Some(key) = rpc::id_key(&id) else {
        return;
    };
    let sender = {
        let mut pending = pending.lock().await;
        pending.remove(&key)
    };
    let Some(sender) = sender else {
        debug!(server = %server, response_id = key, "response for unknown request");
        return;
    };
    if let Some(error) = value.get("error") {
        let (code, message) = rpc::error_parts(error);
        let _ = sender.send(Err(TransportError::Rpc {
            server: server.to_string(),
            code,
            message,
        }));
    } else {
        let _ = sender.send(Ok(value));
    }
}

async fn answer_server_request(server: &str, id: Value, value: &Value, writer: &SharedWriter) {
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let reply = match method {
        "ping" => rpc::response(id, json!({})),
        other => {
            warn!(server = %server, method = other, "server sent unsupported request");
            rpc::error_response(
                id,
                -32601,
                format!("client does not implement method '{other}'"),
            )
        }
    };
    if let Err(err) = write_message(writer, server, &reply).await {
        debug!(server = %server, %err, "failed to answer server request");
    }
}

async fn write_message(
    writer: &SharedWriter,
    server: &str,
    message: &Value,
) -> Result<(), TransportError> {
    let encoded = serde_json::to_string(message).map_err(|source| TransportError::Malformed {
        server: server.to_string(),
        message: format!("could not encode request: {source}"),
    })?;
    let mut writer = writer.lock().await;
    writer
        .write_all(encoded.as_bytes())
        .await
        .map_err(|source| channel_error(server, source))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|source| channel_error(server, source))?;
    writer
        .flush()
        .await
        .map_err(|source| channel_error(server, source))?;
    Ok(())
}

async fn fail_pending(server: &str, pending: &Pending) {
    let mut pending = pending.lock().await;
    for (_, sender) in pending.drain() {
        let _ = sender.send(Err(TransportError::Terminated {
            server: server.to_string(),
        }));
    }
}

fn channel_error(server: &str, source: impl std::fmt::Display) -> TransportError {
    TransportError::Channel {
        server: server.to_string(),
        message: source.to_string(),
    }
}

/// Resolves configured env values. A `$NAME` value is read from the parent
/// process environment at connect time; values that end up empty are dropped
/// entirely rather than passed as empty strings.
fn resolve_env(env: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut resolved = Vec::new();
    for (key, value) in env {
        let key = key.trim();
        let mut value = value.trim().to_string();
        if let Some(name) = value.strip_prefix('$') {
            value = std::env::var(name).unwrap_or_default();
        }
        if key.is_empty() || value.is_empty() {
            continue;
        }
        resolved.push((key.to_string(), value));
    }
    resolved
}

fn is_container_launcher(command: &str) -> bool {
    Path::new(command)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .is_some_and(|stem| CONTAINER_LAUNCHERS.contains(&stem))
}

/// Decides where resolved env vars go. A container launcher never forwards
/// parent-process env into the container, so the variables ride along as
/// `-e KEY=VALUE` argument pairs instead.
fn env_injection(
    command: &str,
    args: &[String],
    env: &BTreeMap<String, String>,
) -> (Vec<String>, Vec<(String, String)>) {
    let resolved = resolve_env(env);
    if is_container_launcher(command) {
        let mut argv = args.to_vec();
        for (key, value) in &resolved {
            argv.push("-e".to_string());
            argv.push(format!("{key}={value}"));
        }
        (argv, Vec::new())
    } else {
        (args.to_vec(), resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn env_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    #[serial]
    fn unset_marker_variable_is_dropped() {
        unsafe {
            env::remove_var("ASTROLABE_TEST_MISSING");
        }
        let resolved = resolve_env(&env_map(&[
            ("API_KEY", "$ASTROLABE_TEST_MISSING"),
            ("KEPT", "literal"),
        ]));
        assert_eq!(resolved, vec![("KEPT".to_string(), "literal".to_string())]);
    }

    #[test]
    #[serial]
    fn marker_variable_resolves_from_parent_env() {
        unsafe {
            env::set_var("ASTROLABE_TEST_TOKEN", "secret-value");
        }
        let resolved = resolve_env(&env_map(&[("TOKEN", "$ASTROLABE_TEST_TOKEN")]));
        assert_eq!(
            resolved,
            vec![("TOKEN".to_string(), "secret-value".to_string())]
        );
        unsafe {
            env::remove_var("ASTROLABE_TEST_TOKEN");
        }
    }

    #[test]
    fn literal_values_are_trimmed_and_kept() {
        let resolved = resolve_env(&env_map(&[(" KEY ", " value "), ("EMPTY", "  ")]));
        assert_eq!(resolved, vec![("KEY".to_string(), "value".to_string())]);
    }

    #[test]
    fn detects_container_launchers_by_file_stem() {
        assert!(is_container_launcher("docker"));
        assert!(is_container_launcher("/usr/bin/docker"));
        assert!(is_container_launcher("podman"));
        assert!(!is_container_launcher("uvx"));
        assert!(!is_container_launcher("npx"));
    }

    #[test]
    fn container_launcher_env_rides_as_flag_arguments() {
        let args = vec!["run".to_string(), "-i".to_string(), "image".to_string()];
        let (argv, child_env) =
            env_injection("docker", &args, &env_map(&[("API_KEY", "secret")]));
        assert_eq!(
            argv,
            vec!["run", "-i", "image", "-e", "API_KEY=secret"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        );
        assert!(child_env.is_empty());
    }

    #[test]
    fn direct_command_env_goes_to_child_process() {
        let args = vec!["serve".to_string()];
        let (argv, child_env) = env_injection("uvx", &args, &env_map(&[("API_KEY", "secret")]));
        assert_eq!(argv, vec!["serve".to_string()]);
        assert_eq!(
            child_env,
            vec![("API_KEY".to_string(), "secret".to_string())]
        );
    }
}
