//! Request/response correlation over one open connection
//!
//! An [`RpcSession`] owns the write half of a byte stream and a background task
//! that owns the read half. Callers allocate an id, register a waiter, write the
//! request under the write lock and then wait for whichever comes first:
//!
//! ```text
//! request(method)
//!   1. id = next_id++            (shared across reconnects)
//!   2. pending.register(id)      (guard removes it on every exit path)
//!   3. write under writer lock
//!   4. select! { response | deadline | closed }
//!
//! reader task
//!   loop frame -> id -> pending.complete(id)
//!   on EOF / error: closed.cancel(); pending.fail_all()
//! ```
//!
//! A request that times out leaves the connection open; its late response is
//! logged and dropped because nobody is registered for the id any more.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kvmcp_protocol::{
    Frame, JsonCodec, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpError, McpResult,
    RequestId,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::pending::PendingRequests;

pub(crate) type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub(crate) type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

type Writer = FramedWrite<BoxedWriter, JsonCodec>;

/// How long `close` waits for an in-flight write before giving up on the writer
const WRITER_CLOSE_GRACE: Duration = Duration::from_secs(1);

pub(crate) struct RpcSession {
    client: String,
    writer: tokio::sync::Mutex<Option<Writer>>,
    pending: Arc<PendingRequests>,
    closed: CancellationToken,
    reader: Mutex<Option<JoinHandle<()>>>,
    next_id: Arc<AtomicI64>,
    timeout: Duration,
}

impl fmt::Debug for RpcSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcSession")
            .field("client", &self.client)
            .field("pending", &self.pending.len())
            .field("closed", &self.closed.is_cancelled())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RpcSession {
    /// Wrap a connected byte stream and start its reader task.
    pub(crate) fn start(
        client: impl Into<String>,
        reader: BoxedReader,
        writer: BoxedWriter,
        next_id: Arc<AtomicI64>,
        timeout: Duration,
    ) -> Arc<Self> {
        let client = client.into();
        let pending = PendingRequests::new();
        let closed = CancellationToken::new();

        let frames = FramedRead::new(reader, JsonCodec::new());
        let task = tokio::spawn(read_loop(
            client.clone(),
            frames,
            Arc::clone(&pending),
            closed.clone(),
        ));

        Arc::new(Self {
            client,
            writer: tokio::sync::Mutex::new(Some(FramedWrite::new(writer, JsonCodec::new()))),
            pending,
            closed,
            reader: Mutex::new(Some(task)),
            next_id,
            timeout,
        })
    }

    /// Token cancelled once the connection is gone
    pub(crate) fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn closed_error(&self) -> McpError {
        McpError::connection_closed(format!("connection to {} closed", self.client))
    }

    /// Send a request and wait for its typed result.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> McpResult<T> {
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (rx, _guard) = self.pending.register(id);

        let request = JsonRpcRequest::new(RequestId::Number(id), method, params);
        self.write(&request).await?;
        tracing::debug!(client = %self.client, id, method, "request sent");

        let response = tokio::select! {
            biased;
            received = rx => received.map_err(|_| self.closed_error())?,
            () = self.closed.cancelled() => return Err(self.closed_error()),
            () = tokio::time::sleep(self.timeout) => {
                tracing::warn!(client = %self.client, id, method, timeout = ?self.timeout, "request timed out");
                return Err(McpError::connection_timeout(format!(
                    "{method} request {id} to {} timed out after {:?}",
                    self.client, self.timeout
                )));
            }
        };

        let result = response.into_result()?;
        serde_json::from_value(result).map_err(|e| {
            McpError::invalid_response(format!("failed to decode {method} result: {e}"))
        })
    }

    /// Send a notification; no response is expected.
    pub(crate) async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        self.write(&JsonRpcNotification::new(method, params)).await
    }

    async fn write<M: Serialize>(&self, message: &M) -> McpResult<()> {
        let write = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or_else(|| self.closed_error())?;
            writer.send(message).await.map_err(|e| {
                McpError::connection_failed(format!("failed to write to {}: {e}", self.client))
            })
        };
        match tokio::time::timeout(self.timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(McpError::connection_timeout(format!(
                "write to {} timed out after {:?}",
                self.client, self.timeout
            ))),
        }
    }

    /// Flush and shut down the write half. Further requests fail as closed.
    pub(crate) async fn close_writer(&self) {
        let taken = tokio::time::timeout(WRITER_CLOSE_GRACE, async {
            self.writer.lock().await.take()
        })
        .await;
        match taken {
            Ok(Some(mut writer)) => {
                if let Err(e) = SinkExt::<Value>::close(&mut writer).await {
                    tracing::debug!(client = %self.client, error = %e, "error closing writer");
                }
            }
            Ok(None) => {}
            Err(_) => {
                tracing::warn!(client = %self.client, "writer busy, dropping it without a clean close");
            }
        }
    }

    /// Tear the connection down and fail every pending request.
    pub(crate) async fn close(&self) {
        self.close_writer().await;
        self.closed.cancel();

        let task = self.reader.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!(client = %self.client, "reader task panicked");
        }

        let failed = self.pending.fail_all();
        if failed > 0 {
            tracing::debug!(client = %self.client, failed, "failed pending requests on close");
        }
    }
}

impl Drop for RpcSession {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn read_loop(
    client: String,
    mut frames: FramedRead<BoxedReader, JsonCodec>,
    pending: Arc<PendingRequests>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            () = closed.cancelled() => break,
            frame = frames.next() => frame,
        };

        match frame {
            Some(Ok(Frame::Message(value))) => route(&client, &pending, value),
            Some(Ok(Frame::Malformed(reason))) => {
                tracing::warn!(client = %client, %reason, "undecodable message from server, closing connection");
                break;
            }
            Some(Err(e)) => {
                tracing::warn!(client = %client, error = %e, "read failed, closing connection");
                break;
            }
            None => {
                tracing::debug!(client = %client, "server closed the stream");
                break;
            }
        }
    }

    closed.cancel();
    let failed = pending.fail_all();
    if failed > 0 {
        tracing::warn!(client = %client, failed, "connection lost with requests in flight");
    }
}

fn route(client: &str, pending: &PendingRequests, mut value: Value) {
    if let Some(method) = value.get("method").and_then(Value::as_str) {
        tracing::debug!(client, method, "ignoring server-initiated message");
        return;
    }

    let Some(id) = value.get("id").and_then(RequestId::numeric_from_value) else {
        tracing::warn!(client, message = %value, "dropping response without a usable id");
        return;
    };
    value["id"] = Value::from(id);

    let response: JsonRpcResponse = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(client, id, error = %e, "dropping malformed response");
            return;
        }
    };

    if pending.complete(id, response) {
        tracing::debug!(client, id, "response routed");
    } else {
        tracing::warn!(client, id, "dropping response for unknown or expired request");
    }
}
