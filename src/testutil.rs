//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as TokenTtl;
use jsonwebtoken::Algorithm;
use tempfile::TempDir;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::auth::{AuthGateway, PasswordHasher, TokenIssuer};
use crate::rpc::{self, ChannelOptions, Handler, ServerOptions, ShutdownOutcome};
use crate::service::BookService;
use crate::storage::models::NewBook;
use crate::storage::{Database, Store};

pub const TEST_SECRET: &[u8] = b"test_secret_key_for_testing_purposes_only";

/// Open a fresh identity store in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_identity_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path(), Store::Identities).unwrap();
    (db, temp_dir)
}

/// Open a fresh, unseeded book store in a temporary directory.
pub fn setup_books_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path(), Store::Books).unwrap();
    (db, temp_dir)
}

/// bcrypt at its minimum cost; the default cost makes suites crawl.
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::new(4)
}

pub fn new_book(title: &str, author: &str, year: i32) -> NewBook {
    NewBook {
        author: author.to_string(),
        title: title.to_string(),
        year,
    }
}

/// An `AuthGateway` over `db` with [`fast_hasher`] and [`TEST_SECRET`].
pub fn test_gateway(db: Database) -> AuthGateway {
    AuthGateway::new(
        db,
        fast_hasher(),
        TokenIssuer::new(TEST_SECRET, Algorithm::HS256),
        TokenTtl::minutes(30),
    )
}

pub fn test_channel_options() -> ChannelOptions {
    ChannelOptions {
        call_timeout: Duration::from_secs(5),
        keepalive_time: Duration::from_secs(60),
        keepalive_timeout: Duration::from_secs(20),
        max_message_size: 4 * 1024 * 1024,
    }
}

pub fn test_server_options() -> ServerOptions {
    ServerOptions {
        keepalive_time: Duration::from_secs(60),
        keepalive_timeout: Duration::from_secs(20),
        max_message_size: 4 * 1024 * 1024,
        max_workers: 8,
        shutdown_timeout: Duration::from_secs(5),
    }
}

/// An RPC server running on an ephemeral port. Dropping it starts a
/// graceful shutdown.
pub struct TestRpcServer {
    pub addr: SocketAddr,
    handle: JoinHandle<ShutdownOutcome>,
    shutdown: oneshot::Sender<()>,
}

impl TestRpcServer {
    /// Trigger shutdown and wait for the server to finish draining.
    pub async fn stop(self) -> ShutdownOutcome {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap()
    }
}

pub async fn start_rpc_server<H: Handler>(handler: Arc<H>, options: ServerOptions) -> TestRpcServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_rpc_on(listener, handler, options)
}

/// Serve on an already bound listener, e.g. to restart on a known address.
pub fn serve_rpc_on<H: Handler>(
    listener: tokio::net::TcpListener,
    handler: Arc<H>,
    options: ServerOptions,
) -> TestRpcServer {
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(rpc::serve(listener, handler, options, async move {
        let _ = shutdown_rx.await;
    }));

    TestRpcServer {
        addr,
        handle,
        shutdown,
    }
}

/// Serve `db` as the book service on an ephemeral port.
pub async fn start_book_service(db: Database) -> TestRpcServer {
    start_rpc_server(Arc::new(BookService::new(db)), test_server_options()).await
}
