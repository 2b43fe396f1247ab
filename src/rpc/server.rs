//! Server side of the book RPC protocol
//!
//! Accepts TCP connections and dispatches each request frame to its own
//! task, so a slow call does not hold up others on the same connection.
//! A semaphore bounds how many handlers run at once across all
//! connections. Requests beyond that wait for a permit without stalling
//! the connection they arrived on.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::bytes::Bytes;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::protocol::{self, Envelope, Request, Response, Status, StatusCode};
use crate::config::RpcConfig;

/// Serves decoded requests. `Ping` never reaches the handler.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> impl Future<Output = Response> + Send;
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub keepalive_time: Duration,
    pub keepalive_timeout: Duration,
    pub max_message_size: usize,
    pub max_workers: usize,
    /// Grace period for in-flight calls once shutdown starts
    pub shutdown_timeout: Duration,
}

impl ServerOptions {
    pub fn from_config(config: &RpcConfig) -> Self {
        Self {
            keepalive_time: config.keepalive_time(),
            keepalive_timeout: config.keepalive_timeout(),
            max_message_size: config.max_message_size,
            max_workers: config.max_workers,
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// A connection with no inbound frame for this long is closed
    fn idle_limit(&self) -> Duration {
        self.keepalive_time + self.keepalive_timeout
    }
}

/// How [`serve`] stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight call finished within the grace period
    Graceful,
    /// The grace period ran out and the remaining calls were abandoned
    Forced,
}

/// Shared by every connection task
struct Context<H> {
    /// Cancelled when the grace period runs out
    abort: CancellationToken,
    handler: Arc<H>,
    options: ServerOptions,
    /// Cancelled when shutdown starts
    shutdown: CancellationToken,
    tracker: TaskTracker,
    workers: Arc<Semaphore>,
}

/// Accept connections on `listener` until `shutdown` resolves, then drain.
pub async fn serve<H, F>(
    listener: TcpListener,
    handler: Arc<H>,
    options: ServerOptions,
    shutdown: F,
) -> ShutdownOutcome
where
    H: Handler,
    F: Future<Output = ()>,
{
    let ctx = Arc::new(Context {
        abort: CancellationToken::new(),
        handler,
        shutdown: CancellationToken::new(),
        tracker: TaskTracker::new(),
        workers: Arc::new(Semaphore::new(options.max_workers)),
        options,
    });

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Accepted RPC connection");
                    let ctx_for_task = Arc::clone(&ctx);
                    ctx.tracker.spawn(async move {
                        if let Err(e) = handle_connection(ctx_for_task, stream, peer).await {
                            debug!(peer = %peer, error = %e, "RPC connection closed");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept RPC connection");
                }
            }
        }
    }

    drop(listener);
    info!(
        grace_secs = ctx.options.shutdown_timeout.as_secs_f64(),
        "RPC server shutting down, draining in-flight calls"
    );
    ctx.shutdown.cancel();
    ctx.tracker.close();

    if tokio::time::timeout(ctx.options.shutdown_timeout, ctx.tracker.wait())
        .await
        .is_ok()
    {
        return ShutdownOutcome::Graceful;
    }

    warn!(
        remaining = ctx.tracker.len(),
        "Grace period elapsed, abandoning in-flight calls"
    );
    ctx.abort.cancel();
    ctx.tracker.wait().await;
    ShutdownOutcome::Forced
}

/// Read request frames from one connection and spawn a task per request.
/// Responses are written by a dedicated writer task in completion order.
async fn handle_connection<H: Handler>(
    ctx: Arc<Context<H>>,
    stream: TcpStream,
    peer: SocketAddr,
) -> Result<(), std::io::Error> {
    stream.set_nodelay(true)?;

    let max_message_size = ctx.options.max_message_size;
    let (mut sink, mut frames) =
        Framed::new(stream, protocol::codec(max_message_size)).split::<Bytes>();

    let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(64);
    ctx.tracker.spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                debug!(peer = %peer, error = %e, "RPC response write failed");
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            _ = ctx.shutdown.cancelled() => break,
            next = tokio::time::timeout(ctx.options.idle_limit(), frames.next()) => match next {
                Err(_) => {
                    debug!(peer = %peer, "Closing idle RPC connection");
                    break;
                }
                Ok(None) => break,
                Ok(Some(frame)) => frame?,
            },
        };

        let envelope: Envelope<Request> = match protocol::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Undecodable RPC request, closing connection");
                break;
            }
        };

        if matches!(envelope.body, Request::Ping) {
            if let Some(pong) = encode_response(envelope.id, &Response::Pong, max_message_size) {
                if out_tx.send(pong).await.is_err() {
                    break;
                }
            }
            continue;
        }

        // The permit is awaited in the request task so this loop keeps
        // reading, and answering pings, while every worker is busy
        let Envelope { id, body } = envelope;
        let workers = Arc::clone(&ctx.workers);
        let handler = Arc::clone(&ctx.handler);
        let abort = ctx.abort.clone();
        let out = out_tx.clone();
        ctx.tracker.spawn(async move {
            let response = tokio::select! {
                response = async {
                    let _permit = workers.acquire_owned().await.ok()?;
                    Some(handler.handle(body).await)
                } => match response {
                    Some(response) => response,
                    None => return,
                },
                _ = abort.cancelled() => return,
            };
            if let Some(frame) = encode_response(id, &response, max_message_size) {
                let _ = out.send(frame).await;
            }
        });
    }

    // The writer exits once every in-flight request has replied
    Ok(())
}

/// Encode a response frame. A response too large for a frame is replaced
/// by a `ResourceExhausted` status.
fn encode_response(id: u64, response: &Response, max_message_size: usize) -> Option<Bytes> {
    let status = match protocol::encode(id, response) {
        Ok(frame) if frame.len() <= max_message_size => return Some(frame),
        Ok(frame) => {
            warn!(id, size = frame.len(), limit = max_message_size, "RPC response too large");
            Status::new(
                StatusCode::ResourceExhausted,
                format!(
                    "Response of {} bytes exceeds the {} byte limit",
                    frame.len(),
                    max_message_size
                ),
            )
        }
        Err(e) => {
            error!(id, error = %e, "Failed to encode RPC response");
            Status::internal("Failed to encode response")
        }
    };

    protocol::encode(id, &Response::Status(status))
        .map_err(|e| error!(id, error = %e, "Failed to encode RPC status"))
        .ok()
}

#[cfg(test)]
mod tests {
    use tokio::sync::Notify;

    use super::*;
    use crate::rpc::transport::{ChannelOptions, RpcChannel, TransportError};
    use crate::storage::models::Book;
    use crate::testutil::{start_rpc_server, test_channel_options, test_server_options};

    /// Returns `count` identical books for `GetBook { id: count }`, after
    /// signalling `started`. `GetBook { id: 0 }` hangs.
    #[derive(Default)]
    struct BulkHandler {
        started: Notify,
    }

    impl Handler for BulkHandler {
        async fn handle(&self, request: Request) -> Response {
            self.started.notify_one();
            match request {
                Request::GetBook { id: 0 } => std::future::pending().await,
                Request::GetBook { id } => Response::Books(
                    (0..id)
                        .map(|i| Book {
                            author: "A".repeat(100),
                            id: i,
                            title: "T".repeat(100),
                            year: 2000,
                        })
                        .collect(),
                ),
                _ => Response::Books(vec![]),
            }
        }
    }

    #[tokio::test]
    async fn test_oversized_response_becomes_status() {
        let options = ServerOptions {
            max_message_size: 4096,
            ..test_server_options()
        };
        let server = start_rpc_server(Arc::new(BulkHandler::default()), options).await;
        let channel = RpcChannel::new(server.addr.to_string(), test_channel_options());

        let response = channel.call(Request::GetBook { id: 2 }).await.unwrap();
        assert!(matches!(response, Response::Books(ref books) if books.len() == 2));

        let response = channel.call(Request::GetBook { id: 500 }).await.unwrap();
        match response {
            Response::Status(status) => assert_eq!(status.code, StatusCode::ResourceExhausted),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_graceful_shutdown_when_idle() {
        let server = start_rpc_server(Arc::new(BulkHandler::default()), test_server_options()).await;
        let channel = RpcChannel::new(server.addr.to_string(), test_channel_options());
        assert!(channel.call(Request::ListBooks).await.is_ok());

        assert_eq!(server.stop().await, ShutdownOutcome::Graceful);
    }

    #[tokio::test]
    async fn test_forced_shutdown_abandons_stuck_call() {
        let handler = Arc::new(BulkHandler::default());
        let options = ServerOptions {
            shutdown_timeout: Duration::from_millis(100),
            ..test_server_options()
        };
        let server = start_rpc_server(Arc::clone(&handler), options).await;
        let channel = RpcChannel::new(server.addr.to_string(), test_channel_options());

        let stuck = tokio::spawn({
            let channel = channel.clone();
            async move { channel.call(Request::GetBook { id: 0 }).await }
        });
        handler.started.notified().await;

        assert_eq!(server.stop().await, ShutdownOutcome::Forced);

        let err = stuck.await.unwrap().unwrap_err();
        assert!(matches!(err, TransportError::ConnectionClosed), "got {err:?}");
    }

    /// `GetBook { id: 1 }` holds its worker until the gate opens.
    #[derive(Default)]
    struct GatedHandler {
        gate: Notify,
        started: Notify,
    }

    impl Handler for GatedHandler {
        async fn handle(&self, request: Request) -> Response {
            if matches!(request, Request::GetBook { id: 1 }) {
                self.started.notify_one();
                self.gate.notified().await;
            }
            Response::Books(vec![])
        }
    }

    #[tokio::test]
    async fn test_saturated_server_still_answers_keepalive() {
        let handler = Arc::new(GatedHandler::default());
        let options = ServerOptions {
            max_workers: 1,
            ..test_server_options()
        };
        let server = start_rpc_server(Arc::clone(&handler), options).await;
        let channel = RpcChannel::new(
            server.addr.to_string(),
            ChannelOptions {
                keepalive_time: Duration::from_millis(50),
                keepalive_timeout: Duration::from_millis(150),
                ..test_channel_options()
            },
        );

        let busy = tokio::spawn({
            let channel = channel.clone();
            async move { channel.call(Request::GetBook { id: 1 }).await }
        });
        handler.started.notified().await;
        let queued = tokio::spawn({
            let channel = channel.clone();
            async move { channel.call(Request::ListBooks).await }
        });

        // Several keepalive windows pass with the only worker taken
        tokio::time::sleep(Duration::from_millis(600)).await;
        handler.gate.notify_one();

        assert_eq!(busy.await.unwrap().unwrap(), Response::Books(vec![]));
        assert_eq!(queued.await.unwrap().unwrap(), Response::Books(vec![]));
    }
}
