//! Stdio transport: framed inbound reader and a single outbound writer task

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use super::JsonLineCodec;
use crate::protocol::JsonRpcResponse;
use crate::{Error, Result};

/// Inbound side: a stream of parsed JSON documents
pub type InboundFrames<R> = FramedRead<R, JsonLineCodec>;

/// Wrap a byte stream (usually stdin) in the line codec
pub fn inbound<R: AsyncRead>(reader: R) -> InboundFrames<R> {
    FramedRead::new(reader, JsonLineCodec::new())
}

/// Cloneable handle for queueing responses to the writer task
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: mpsc::UnboundedSender<JsonRpcResponse>,
}

impl ResponseSender {
    /// Queue a response. Returns `false` once the writer has stopped.
    pub fn send(&self, response: JsonRpcResponse) -> bool {
        if self.tx.send(response).is_err() {
            warn!("Response dropped: output stream closed");
            return false;
        }
        true
    }
}

/// Spawn the task that owns the output stream.
///
/// Every response is encoded as one line and flushed before the next is
/// taken, so concurrent handlers never interleave bytes. The task ends when
/// every [`ResponseSender`] is dropped or the stream fails.
pub fn spawn_writer<W>(writer: W) -> (ResponseSender, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

    let handle = tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, JsonLineCodec::new());

        while let Some(response) = rx.recv().await {
            debug!(id = %response.id, error = response.is_error(), "Writing response");
            sink.send(response)
                .await
                .map_err(|e| Error::Transport(format!("Failed to write response: {e}")))?;
        }

        SinkExt::<JsonRpcResponse>::close(&mut sink)
            .await
            .map_err(|e| Error::Transport(format!("Failed to close output: {e}")))?;
        debug!("Writer task ended");
        Ok(())
    });

    (ResponseSender { tx }, handle)
}
