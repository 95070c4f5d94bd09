//! MCP server over stdio.
//!
//! The read loop never waits on a handler: each request runs in its own
//! task and answers through the single writer task, so responses may
//! arrive out of order but are never interleaved on the wire.

mod router;
mod session;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::{FutureExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

pub use self::router::Router;
pub use self::session::{ClientDetails, Session};
use crate::config::ServerConfig;
use crate::error::rpc_codes;
use crate::gateway::FetchGateway;
use crate::protocol::{IncomingMessage, JsonRpcResponse, RequestId};
use crate::transport::{ResponseSender, inbound, spawn_writer};
use crate::{Error, Result};

/// MCP server: shared router plus concurrency limits
#[derive(Clone)]
pub struct McpServer {
    router: Arc<Router>,
    max_in_flight: usize,
    shutdown_timeout: Duration,
}

impl McpServer {
    /// Create a server that delegates tool calls to `gateway`
    pub fn new(config: &ServerConfig, gateway: Arc<dyn FetchGateway>) -> Self {
        Self {
            router: Arc::new(Router::new(config, gateway)),
            max_in_flight: config.max_in_flight.max(1),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Number of registered tools
    #[must_use]
    pub fn tool_count(&self) -> usize {
        self.router.tools().len()
    }

    /// Serve on the process's stdin/stdout until stdin closes.
    ///
    /// # Errors
    ///
    /// Returns an error if reading stdin or writing stdout fails.
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve one session over an arbitrary byte stream pair.
    ///
    /// Returns once the input reaches EOF and every in-flight request has
    /// answered (or `shutdown_timeout` elapsed).
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or the output fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let session = Arc::new(Session::new());
        let (sender, writer_task) = spawn_writer(writer);
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks = JoinSet::new();
        let mut frames = inbound(reader);

        debug!(session = %session.id(), max_in_flight = self.max_in_flight, "Session started");

        let read_result: Result<()> = loop {
            let value = match frames.next().await {
                Some(Ok(value)) => value,
                Some(Err(e)) => break Err(Error::Io(e)),
                None => break Ok(()),
            };

            match IncomingMessage::classify(value) {
                IncomingMessage::Request(request) => {
                    let Ok(permit) = permits.clone().acquire_owned().await else {
                        break Err(Error::Internal("request semaphore closed".to_string()));
                    };
                    let router = Arc::clone(&self.router);
                    let session = Arc::clone(&session);
                    let sender = sender.clone();
                    tasks.spawn(async move {
                        let id = request.id.clone();
                        let method = request.method.clone();
                        let response = AssertUnwindSafe(router.handle_request(&session, request))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                error!(id = %id, method = %method, "Request handler panicked");
                                JsonRpcResponse::error(id, rpc_codes::INTERNAL_ERROR, "Internal error")
                            });
                        sender.send(response);
                        drop(permit);
                    });
                }
                IncomingMessage::Notification(notification) => {
                    self.router.handle_notification(&session, &notification);
                }
                IncomingMessage::Response(value) => {
                    debug!(message = %value, "Ignoring response from client");
                }
                IncomingMessage::Invalid { id: Some(id), reason } => {
                    warn!(id = %id, reason = %reason, "Invalid JSON-RPC message");
                    reply_invalid(&sender, id, &reason);
                }
                IncomingMessage::Invalid { id: None, reason } => {
                    warn!(reason = %reason, "Invalid JSON-RPC notification dropped");
                }
            }

            // Reap finished tasks so the set does not grow unbounded
            while let Some(joined) = tasks.try_join_next() {
                if let Err(e) = joined {
                    warn!(error = %e, "Request task failed");
                }
            }
        };

        info!(in_flight = tasks.len(), "Input closed, draining in-flight requests");
        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "Request task failed");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                abandoned = tasks.len(),
                timeout_ms = u64::try_from(self.shutdown_timeout.as_millis()).unwrap_or(u64::MAX),
                "Shutdown timeout reached, abandoning in-flight requests"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        drop(sender);
        let write_result = writer_task
            .await
            .map_err(|e| Error::Internal(format!("writer task failed: {e}")))?;

        debug!(session = %session.id(), "Session ended");
        read_result.and(write_result)
    }
}

fn reply_invalid(sender: &ResponseSender, id: RequestId, reason: &str) {
    sender.send(JsonRpcResponse::error(
        id,
        rpc_codes::INVALID_REQUEST,
        format!("Invalid Request: {reason}"),
    ));
}
