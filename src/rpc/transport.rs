//! Client side of the book RPC protocol
//!
//! One background task owns the TCP connection. Callers enqueue requests
//! via an mpsc channel and await responses via oneshot. Each request is
//! written as soon as it is dequeued and tagged with a correlation id, so
//! any number of calls can be in flight on the single connection.
//!
//! The connection is opened lazily on the first call and, after it is
//! lost, reopened lazily on the next one. Calls that were in flight when
//! it was lost fail; nothing is retried.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

use super::protocol::{self, Request, Response};
use crate::config::RpcConfig;

/// Error type for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(std::io::Error),
    #[error("Serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Deserialization error: {0}")]
    Decode(String),
    #[error("Connection closed by peer")]
    ConnectionClosed,
    #[error("Channel task unavailable")]
    Unavailable,
    #[error("No keepalive response from peer")]
    KeepaliveTimeout,
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    #[error("Message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Upper bound on a whole call, queueing and connecting included
    pub call_timeout: Duration,
    /// Silence on the connection before a `Ping` is sent
    pub keepalive_time: Duration,
    /// How long to wait for any frame after a `Ping`
    pub keepalive_timeout: Duration,
    pub max_message_size: usize,
}

impl ChannelOptions {
    pub fn from_config(config: &RpcConfig) -> Self {
        Self {
            call_timeout: config.call_timeout(),
            keepalive_time: config.keepalive_time(),
            keepalive_timeout: config.keepalive_timeout(),
            max_message_size: config.max_message_size,
        }
    }
}

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

type Reply = oneshot::Sender<Result<Response, TransportError>>;

/// A request sent to the channel's background task
type Call = (Request, Reply);

/// Handle to a long-lived RPC channel. Clones share the same connection.
#[derive(Clone)]
pub struct RpcChannel {
    addr: String,
    call_timeout: Duration,
    tx: mpsc::Sender<Call>,
}

impl RpcChannel {
    /// Create the channel and spawn its connection task. No connection is
    /// attempted until the first call. Must be called inside a runtime.
    pub fn new(addr: impl Into<String>, options: ChannelOptions) -> Self {
        let addr = addr.into();
        let (tx, rx) = mpsc::channel::<Call>(256);
        let call_timeout = options.call_timeout;

        tokio::spawn(run_channel(addr.clone(), options, rx));

        Self {
            addr,
            call_timeout,
            tx,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send a request and wait for its response, bounded by the call
    /// deadline.
    pub async fn call(&self, request: Request) -> Result<Response, TransportError> {
        let round_trip = async {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.tx
                .send((request, reply_tx))
                .await
                .map_err(|_| TransportError::Unavailable)?;

            reply_rx.await.map_err(|_| TransportError::Unavailable)?
        };

        match tokio::time::timeout(self.call_timeout, round_trip).await {
            Ok(result) => result,
            Err(_) => {
                debug!(addr = %self.addr, "RPC call deadline exceeded");
                Err(TransportError::DeadlineExceeded)
            }
        }
    }
}

impl std::fmt::Debug for RpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChannel")
            .field("addr", &self.addr)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

// ============================================================================
// Background connection task
// ============================================================================

/// Why a connection session ended
enum SessionEnd {
    /// Every handle was dropped; the task should exit
    ChannelClosed,
    /// The connection is gone; reconnect on the next call
    Disconnected,
}

async fn run_channel(addr: String, options: ChannelOptions, mut rx: mpsc::Receiver<Call>) {
    let mut next_id: u64 = 0;

    while let Some(call) = rx.recv().await {
        let conn = match connect(&addr, &options).await {
            Ok(conn) => conn,
            Err(e) => {
                debug!(addr = %addr, error = %e, "RPC connect failed");
                let _ = call.1.send(Err(e));
                continue;
            }
        };

        match run_session(conn, call, &mut rx, &options, &mut next_id).await {
            SessionEnd::ChannelClosed => break,
            SessionEnd::Disconnected => {
                debug!(addr = %addr, "RPC connection lost, will reconnect on next call");
            }
        }
    }

    debug!(addr = %addr, "RPC channel task exiting (channel closed)");
}

/// Create a new framed TCP connection to the backend
async fn connect(addr: &str, options: &ChannelOptions) -> Result<Connection, TransportError> {
    debug!(addr = %addr, "Connecting to RPC backend");
    let stream = tokio::time::timeout(options.call_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::DeadlineExceeded)?
        .map_err(TransportError::Connect)?;
    stream.set_nodelay(true).map_err(TransportError::Connect)?;

    Ok(Framed::new(stream, protocol::codec(options.max_message_size)))
}

/// Drive one connection until it is lost or every handle is dropped.
async fn run_session(
    conn: Connection,
    first: Call,
    rx: &mut mpsc::Receiver<Call>,
    options: &ChannelOptions,
    next_id: &mut u64,
) -> SessionEnd {
    let (mut sink, mut stream) = conn.split::<Bytes>();
    let mut pending: HashMap<u64, Reply> = HashMap::new();

    let mut last_inbound = Instant::now();
    let mut ping_sent: Option<Instant> = None;
    let tick = options
        .keepalive_time
        .min(options.keepalive_timeout)
        .max(Duration::from_millis(50));
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    if send_call(&mut sink, &mut pending, next_id, first, options).await.is_err() {
        fail_pending(&mut pending, || TransportError::ConnectionClosed);
        return SessionEnd::Disconnected;
    }

    loop {
        tokio::select! {
            call = rx.recv() => {
                let Some(call) = call else {
                    return SessionEnd::ChannelClosed;
                };
                if send_call(&mut sink, &mut pending, next_id, call, options).await.is_err() {
                    fail_pending(&mut pending, || TransportError::ConnectionClosed);
                    return SessionEnd::Disconnected;
                }
            }
            frame = stream.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!(error = %e, "RPC connection read failed");
                        fail_pending(&mut pending, || TransportError::ConnectionClosed);
                        return SessionEnd::Disconnected;
                    }
                    None => {
                        fail_pending(&mut pending, || TransportError::ConnectionClosed);
                        return SessionEnd::Disconnected;
                    }
                };

                last_inbound = Instant::now();
                ping_sent = None;

                match protocol::decode::<Response>(&frame) {
                    Ok(envelope) => {
                        // Pongs and responses to abandoned calls have no waiter
                        if let Some(reply) = pending.remove(&envelope.id) {
                            let _ = reply.send(Ok(envelope.body));
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Undecodable frame from RPC backend");
                        let message = e.to_string();
                        fail_pending(&mut pending, || TransportError::Decode(message.clone()));
                        return SessionEnd::Disconnected;
                    }
                }
            }
            _ = ticker.tick() => {
                pending.retain(|_, reply| !reply.is_closed());

                let now = Instant::now();
                match ping_sent {
                    Some(sent) if now.duration_since(sent) >= options.keepalive_timeout => {
                        warn!("RPC keepalive timed out");
                        fail_pending(&mut pending, || TransportError::KeepaliveTimeout);
                        return SessionEnd::Disconnected;
                    }
                    None if now.duration_since(last_inbound) >= options.keepalive_time => {
                        *next_id += 1;
                        let ping = match protocol::encode(*next_id, &Request::Ping) {
                            Ok(ping) => ping,
                            Err(e) => {
                                warn!(error = %e, "Failed to encode keepalive ping");
                                continue;
                            }
                        };
                        if sink.send(ping).await.is_err() {
                            fail_pending(&mut pending, || TransportError::ConnectionClosed);
                            return SessionEnd::Disconnected;
                        }
                        ping_sent = Some(now);
                    }
                    _ => {}
                }
            }
        }
    }
}

/// Write one call to the connection. Errors that concern only this call
/// are reported to its caller; `Err` means the connection is unusable.
async fn send_call(
    sink: &mut SplitSink<Connection, Bytes>,
    pending: &mut HashMap<u64, Reply>,
    next_id: &mut u64,
    (request, reply): Call,
    options: &ChannelOptions,
) -> Result<(), TransportError> {
    // The caller already gave up
    if reply.is_closed() {
        return Ok(());
    }

    *next_id += 1;
    let id = *next_id;

    let payload = match protocol::encode(id, &request) {
        Ok(payload) => payload,
        Err(e) => {
            let _ = reply.send(Err(e.into()));
            return Ok(());
        }
    };

    if payload.len() > options.max_message_size {
        let _ = reply.send(Err(TransportError::MessageTooLarge {
            size: payload.len(),
            limit: options.max_message_size,
        }));
        return Ok(());
    }

    pending.insert(id, reply);
    sink.send(payload).await.map_err(|e| {
        debug!(error = %e, "RPC connection write failed");
        TransportError::ConnectionClosed
    })
}

fn fail_pending(pending: &mut HashMap<u64, Reply>, error: impl Fn() -> TransportError) {
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(error()));
    }
}
