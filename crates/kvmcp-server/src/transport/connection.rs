//! Per-connection request loop shared by every transport

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use kvmcp_protocol::{CodecError, Frame, JsonCodec, JsonRpcResponse, McpError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::Instrument;

use super::TransportError;
use crate::router::Router;

/// Outcome of waiting for the next frame
enum Next {
    Frame(Frame),
    Eof,
    Idle,
    Shutdown,
}

/// Serve one peer until EOF, idle timeout, shutdown or an I/O failure.
///
/// A zero `timeout` disables both the idle deadline and the write bound.
pub(crate) async fn serve_connection<R, W>(
    reader: R,
    writer: W,
    router: Arc<Router>,
    timeout: Duration,
    shutdown: watch::Receiver<bool>,
    peer: String,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let span = tracing::debug_span!("connection", id = %uuid::Uuid::new_v4(), %peer);
    run(reader, writer, router, timeout, shutdown)
        .instrument(span)
        .await
}

async fn run<R, W>(
    reader: R,
    writer: W,
    router: Arc<Router>,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut frames = FramedRead::new(reader, JsonCodec::new());
    let mut sink = FramedWrite::new(writer, JsonCodec::new());
    tracing::debug!("connection opened");

    loop {
        let next = tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => Next::Shutdown,
            next = read_frame(&mut frames, timeout) => next?,
        };

        let response = match next {
            Next::Frame(Frame::Message(value)) => router.handle_value(value).await,
            Next::Frame(Frame::Malformed(reason)) => {
                tracing::warn!(%reason, "malformed message");
                Some(JsonRpcResponse::error(None, McpError::parse_error(reason)))
            }
            Next::Eof => {
                tracing::debug!("peer closed the connection");
                break;
            }
            Next::Idle => {
                tracing::debug!(?timeout, "idle timeout");
                break;
            }
            Next::Shutdown => {
                tracing::debug!("shutting down connection");
                break;
            }
        };

        if let Some(response) = response {
            write(&mut sink, response, timeout).await?;
        }
    }
    Ok(())
}

async fn read_frame<R>(
    frames: &mut FramedRead<R, JsonCodec>,
    timeout: Duration,
) -> Result<Next, TransportError>
where
    R: AsyncRead + Unpin,
{
    let next = if timeout.is_zero() {
        frames.next().await
    } else {
        match tokio::time::timeout(timeout, frames.next()).await {
            Ok(next) => next,
            Err(_) => return Ok(Next::Idle),
        }
    };
    match next {
        Some(Ok(frame)) => Ok(Next::Frame(frame)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(Next::Eof),
    }
}

async fn write<W>(
    sink: &mut FramedWrite<W, JsonCodec>,
    response: JsonRpcResponse,
    timeout: Duration,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    if timeout.is_zero() {
        return Ok(sink.send(response).await?);
    }
    tokio::time::timeout(timeout, sink.send(response))
        .await
        .map_err(|_| TransportError::WriteTimeout(timeout))?
        .map_err(TransportError::from)
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other.to_string()),
        }
    }
}
