//! book-gateway - REST gateway in front of an RPC book service
//!
//! This crate provides:
//! - User registration and login with bcrypt password hashes and JWT
//!   bearer tokens
//! - A bearer-guarded CRUD façade that forwards `/books` operations to the
//!   book service over a length-delimited MessagePack RPC protocol
//! - The book service itself, backed by its own redb store
//! - redb embedded database (ACID, MVCC, crash-safe)

pub mod api;
pub mod auth;
pub mod books;
pub mod config;
pub mod rpc;
pub mod service;
pub mod signal;
pub mod storage;
pub mod telemetry;
#[cfg(test)]
pub mod testutil;

use auth::AuthGateway;
use books::RecordClient;
use config::Config;
use storage::Database;

/// Shared application state
pub struct AppState {
    pub auth: AuthGateway,
    pub books: RecordClient,
    pub config: Config,
}

impl AppState {
    /// Wire the gateway around an opened identity store. The book service
    /// channel is created here but connects on first use.
    pub fn new(config: Config, db: Database) -> Self {
        Self {
            auth: AuthGateway::from_config(db, &config.auth),
            books: RecordClient::connect(&config.rpc),
            config,
        }
    }
}
