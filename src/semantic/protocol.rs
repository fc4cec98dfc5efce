//! JSON-RPC 2.0 over `Content-Length` framed streams.
//!
//! [`RpcClient`] owns the write half of a connection and a reader task on
//! the tokio runtime that routes responses to waiting requests by id.
//! Requests the server sends to us (configuration pulls, progress tokens,
//! capability registration) are answered with `null` so the server never
//! blocks waiting on the client. When the stream ends every pending request
//! fails with [`SemanticError::ServerExited`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, trace, warn};

use super::SemanticError;

/// Encode one message with its `Content-Length` header.
pub fn encode_message(value: &Value) -> Vec<u8> {
    let body = value.to_string();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut out = header.into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

fn content_length<'a>(lines: impl Iterator<Item = &'a str>) -> Result<usize, SemanticError> {
    let mut length = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                length = Some(value.trim().parse::<usize>().map_err(|e| {
                    SemanticError::Protocol(format!("bad Content-Length: {}", e))
                })?);
            }
        }
    }
    length.ok_or_else(|| SemanticError::Protocol("missing Content-Length".into()))
}

/// Read one framed message. `Ok(None)` means a clean end of stream.
pub async fn read_message<R>(reader: &mut BufReader<R>) -> Result<Option<Value>, SemanticError>
where
    R: AsyncRead + Unpin,
{
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            if headers.is_empty() {
                continue;
            }
            break;
        }
        headers.push(line.to_string());
    }
    let length = content_length(headers.iter().map(|s| s.as_str()))?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    Ok(Some(serde_json::from_slice(&body)?))
}

type Reply = Result<Value, SemanticError>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct Shared {
    writer: tokio::sync::Mutex<Writer>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    alive: AtomicBool,
}

impl Shared {
    async fn send(&self, message: &Value) -> Result<(), SemanticError> {
        let bytes = encode_message(message);
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    fn fail_pending(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let drained: Vec<_> = self
            .pending
            .lock()
            .map(|mut p| p.drain().collect())
            .unwrap_or_default();
        for (_, tx) in drained {
            let _ = tx.send(Err(SemanticError::ServerExited));
        }
    }
}

/// Client half of a JSON-RPC connection.
pub struct RpcClient {
    shared: Arc<Shared>,
    next_id: AtomicU64,
    admission: Arc<Semaphore>,
}

impl RpcClient {
    /// Start the reader task on `handle` and return the client.
    ///
    /// `max_in_flight` bounds concurrent requests awaiting a response.
    pub fn start<R, W>(handle: &Handle, reader: R, writer: W, max_in_flight: usize) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
        });
        handle.spawn(reader_loop(BufReader::new(reader), shared.clone()));
        Arc::new(Self {
            shared,
            next_id: AtomicU64::new(1),
            admission: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Send a request and wait up to `timeout` for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SemanticError> {
        let _permit = self
            .admission
            .acquire()
            .await
            .map_err(|_| SemanticError::ServerExited)?;
        if !self.is_alive() {
            return Err(SemanticError::ServerExited);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.insert(id, tx);
        }

        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        trace!(id, method, "sending request");
        if let Err(err) = self.shared.send(&message).await {
            self.forget(id);
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(SemanticError::ServerExited),
            Err(_) => {
                self.forget(id);
                Err(SemanticError::RequestTimeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    pub async fn notify(&self, method: &str, params: Value) -> Result<(), SemanticError> {
        if !self.is_alive() {
            return Err(SemanticError::ServerExited);
        }
        let message = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.shared.send(&message).await
    }

    fn forget(&self, id: u64) {
        if let Ok(mut pending) = self.shared.pending.lock() {
            pending.remove(&id);
        }
    }

    /// Fail every pending request and refuse new ones.
    pub fn close(&self) {
        self.shared.fail_pending();
    }
}

async fn reader_loop<R>(mut reader: BufReader<R>, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_message(&mut reader).await {
            Ok(Some(message)) => dispatch(&shared, message).await,
            Ok(None) => {
                debug!("language server closed its output");
                break;
            }
            Err(err) => {
                warn!(error = %err, "failed to read from language server");
                break;
            }
        }
    }
    shared.fail_pending();
}

async fn dispatch(shared: &Shared, message: Value) {
    let method = message.get("method").and_then(Value::as_str);
    let id = message.get("id").cloned();

    match (method, id) {
        // Server-to-client request
        (Some(method), Some(id)) => {
            let result = server_request_result(method, message.get("params"));
            let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
            if let Err(err) = shared.send(&reply).await {
                debug!(method, error = %err, "could not answer server request");
            }
        }
        // Notification (diagnostics, logs, progress)
        (Some(method), None) => trace!(method, "ignoring notification"),
        // Response to one of ours
        (None, Some(id)) => {
            let Some(id) = id.as_u64() else {
                return;
            };
            let sender = shared.pending.lock().ok().and_then(|mut p| p.remove(&id));
            let Some(sender) = sender else {
                trace!(id, "response for unknown or expired request");
                return;
            };
            let reply = match message.get("error") {
                Some(error) => Err(SemanticError::Protocol(
                    error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_string(),
                )),
                None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
            };
            let _ = sender.send(reply);
        }
        (None, None) => trace!("ignoring malformed message"),
    }
}

/// Result sent back for a request initiated by the server.
fn server_request_result(method: &str, params: Option<&Value>) -> Value {
    match method {
        // One entry per requested configuration section
        "workspace/configuration" => {
            let items = params
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map(|items| items.len())
                .unwrap_or(0);
            Value::Array(vec![Value::Null; items])
        }
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    #[test]
    fn test_read_back_to_back_frames() {
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"});
        let mut bytes = encode_message(&msg);
        bytes.extend_from_slice(b"Content-Length: 2\r\n\r\n{}");

        let rt = runtime();
        rt.block_on(async {
            let mut reader = BufReader::new(&bytes[..]);
            assert_eq!(read_message(&mut reader).await.unwrap(), Some(msg));
            assert_eq!(read_message(&mut reader).await.unwrap(), Some(json!({})));
            assert_eq!(read_message(&mut reader).await.unwrap(), None);
        });
    }

    #[test]
    fn test_read_rejects_missing_length() {
        let rt = runtime();
        rt.block_on(async {
            let mut reader = BufReader::new(&b"X-Other: 1\r\n\r\n{}"[..]);
            let err = read_message(&mut reader).await.err().unwrap();
            assert!(matches!(err, SemanticError::Protocol(_)));

            // Body shorter than announced
            let mut reader = BufReader::new(&b"Content-Length: 10\r\n\r\n{}"[..]);
            assert!(read_message(&mut reader).await.is_err());
        });
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    /// Minimal server: answers `echo` with its params, asks the client for
    /// configuration once, and never answers `hang`.
    async fn fake_server(stream: DuplexStream) {
        let (read, mut write) = tokio::io::split(stream);
        let mut reader = BufReader::new(read);
        let mut asked = false;
        while let Ok(Some(msg)) = read_message(&mut reader).await {
            let method = msg.get("method").and_then(Value::as_str).unwrap_or("");
            if !asked {
                asked = true;
                let req = json!({"jsonrpc": "2.0", "id": "cfg-1", "method": "workspace/configuration",
                                 "params": {"items": [{}, {}]}});
                write.write_all(&encode_message(&req)).await.unwrap();
            }
            match method {
                "echo" => {
                    let reply = json!({"jsonrpc": "2.0", "id": msg["id"], "result": msg["params"]});
                    write.write_all(&encode_message(&reply)).await.unwrap();
                }
                "fail" => {
                    let reply = json!({"jsonrpc": "2.0", "id": msg["id"],
                                       "error": {"code": -32601, "message": "no such method"}});
                    write.write_all(&encode_message(&reply)).await.unwrap();
                }
                "quit" => return,
                _ => {}
            }
        }
    }

    #[test]
    fn test_request_response_and_errors() {
        let rt = runtime();
        let (client_side, server_side) = duplex(64 * 1024);
        rt.spawn(fake_server(server_side));
        let (read, write) = tokio::io::split(client_side);
        let client = RpcClient::start(rt.handle(), read, write, 4);

        rt.block_on(async {
            let value = client
                .request("echo", json!({"x": 1}), Duration::from_secs(5))
                .await
                .unwrap();
            assert_eq!(value, json!({"x": 1}));

            let err = client
                .request("fail", json!(null), Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, SemanticError::Protocol(_)));

            let err = client
                .request("hang", json!(null), Duration::from_millis(50))
                .await
                .unwrap_err();
            assert!(matches!(err, SemanticError::RequestTimeout { .. }));
        });
    }

    #[test]
    fn test_pending_requests_fail_when_server_exits() {
        let rt = runtime();
        let (client_side, server_side) = duplex(64 * 1024);
        rt.spawn(fake_server(server_side));
        let (read, write) = tokio::io::split(client_side);
        let client = RpcClient::start(rt.handle(), read, write, 4);

        rt.block_on(async {
            let err = client
                .request("quit", json!(null), Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, SemanticError::ServerExited));
        });
        assert!(!client.is_alive());
    }

    #[test]
    fn test_configuration_requests_get_one_null_per_item() {
        let result = server_request_result(
            "workspace/configuration",
            Some(&json!({"items": [{"section": "python"}, {"section": "x"}]})),
        );
        assert_eq!(result, json!([null, null]));
        assert_eq!(server_request_result("client/registerCapability", None), Value::Null);
    }
}
