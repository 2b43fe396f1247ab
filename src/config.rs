use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use thiserror::Error;

const DEFAULT_JWT_SECRET: &str = "change-me-in-production";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub rpc: RpcConfig,
    pub storage: StorageConfig,
}

/// REST listener of the gateway.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

/// Token signing and password hashing.
#[derive(Clone)]
pub struct AuthConfig {
    pub algorithm: Algorithm,
    pub bcrypt_cost: u32,
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
}

/// Both ends of the book RPC link.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Per-call deadline on the gateway side
    pub call_timeout_ms: u64,
    pub host: String,
    pub keepalive_time_ms: u64,
    pub keepalive_timeout_ms: u64,
    /// Frame size ceiling in bytes, applied on send and receive
    pub max_message_size: usize,
    /// Concurrently executing handlers on the service side
    pub max_workers: usize,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub books_data_dir: String,
    /// Identity store directory (gateway)
    pub data_dir: String,
    pub seed_books: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::HS256,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_minutes: 30,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 30_000,
            host: "localhost".to_string(),
            keepalive_time_ms: 60_000,
            keepalive_timeout_ms: 20_000,
            max_message_size: 50 * 1024 * 1024,
            max_workers: 10,
            port: 50051,
            shutdown_timeout_secs: 30,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            books_data_dir: "./data".to_string(),
            data_dir: "./data".to_string(),
            seed_books: true,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("algorithm", &self.algorithm)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl AuthConfig {
    /// Saturates at `chrono::Duration::MAX`; `validate` rejects anything
    /// that would get there.
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_minutes(self.token_ttl_minutes).unwrap_or(chrono::Duration::MAX)
    }
}

impl RpcConfig {
    /// Address the gateway dials.
    pub fn target_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address the service binds.
    pub fn bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn keepalive_time(&self) -> Duration {
        Duration::from_millis(self.keepalive_time_ms)
    }

    pub fn keepalive_timeout(&self) -> Duration {
        Duration::from_millis(self.keepalive_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults_api = ApiConfig::default();
        let defaults_auth = AuthConfig::default();
        let defaults_rpc = RpcConfig::default();
        let defaults_storage = StorageConfig::default();

        let algorithm = match lookup("JWT_ALGORITHM") {
            Some(name) => parse_algorithm(&name)?,
            None => defaults_auth.algorithm,
        };

        let jwt_secret = match lookup("JWT_SECRET_KEY") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET_KEY not set, using the built-in development secret");
                defaults_auth.jwt_secret
            }
        };

        let max_message_size_mb: usize = parse_or(&lookup, "GRPC_MAX_MESSAGE_SIZE", 50)?;

        let seed_books = lookup("BOOKS_SEED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults_storage.seed_books);

        let config = Config {
            api: ApiConfig {
                host: lookup("API_HOST").unwrap_or(defaults_api.host),
                port: parse_or(&lookup, "API_PORT", defaults_api.port)?,
            },
            auth: AuthConfig {
                algorithm,
                bcrypt_cost: parse_or(&lookup, "BCRYPT_COST", defaults_auth.bcrypt_cost)?,
                jwt_secret,
                token_ttl_minutes: parse_or(
                    &lookup,
                    "JWT_ACCESS_TOKEN_EXPIRE_MINUTES",
                    defaults_auth.token_ttl_minutes,
                )?,
            },
            rpc: RpcConfig {
                call_timeout_ms: parse_or(&lookup, "GRPC_CALL_TIMEOUT", defaults_rpc.call_timeout_ms)?,
                host: lookup("GRPC_HOST").unwrap_or(defaults_rpc.host),
                keepalive_time_ms: parse_or(
                    &lookup,
                    "GRPC_KEEPALIVE_TIME",
                    defaults_rpc.keepalive_time_ms,
                )?,
                keepalive_timeout_ms: parse_or(
                    &lookup,
                    "GRPC_KEEPALIVE_TIMEOUT",
                    defaults_rpc.keepalive_timeout_ms,
                )?,
                max_message_size: max_message_size_mb.saturating_mul(1024 * 1024),
                max_workers: parse_or(&lookup, "GRPC_MAX_WORKERS", defaults_rpc.max_workers)?,
                port: parse_or(&lookup, "GRPC_PORT", defaults_rpc.port)?,
                shutdown_timeout_secs: parse_or(
                    &lookup,
                    "GRPC_SHUTDOWN_TIMEOUT",
                    defaults_rpc.shutdown_timeout_secs,
                )?,
            },
            storage: StorageConfig {
                books_data_dir: lookup("BOOKS_DATA_DIR").unwrap_or(defaults_storage.books_data_dir),
                data_dir: lookup("DATA_DIR").unwrap_or(defaults_storage.data_dir),
                seed_books,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api.port == 0 {
            return Err(ConfigError::ValidationError(
                "API_PORT cannot be 0".to_string(),
            ));
        }
        if self.rpc.port == 0 {
            return Err(ConfigError::ValidationError(
                "GRPC_PORT cannot be 0".to_string(),
            ));
        }
        if self.rpc.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "GRPC_MAX_MESSAGE_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.rpc.max_workers == 0 {
            return Err(ConfigError::ValidationError(
                "GRPC_MAX_WORKERS must be greater than 0".to_string(),
            ));
        }
        if self.rpc.keepalive_time_ms == 0 || self.rpc.keepalive_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "GRPC_KEEPALIVE_TIME and GRPC_KEEPALIVE_TIMEOUT must be greater than 0".to_string(),
            ));
        }
        if self.rpc.call_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "GRPC_CALL_TIMEOUT must be greater than 0".to_string(),
            ));
        }
        if self.auth.token_ttl_minutes <= 0 {
            return Err(ConfigError::ValidationError(
                "JWT_ACCESS_TOKEN_EXPIRE_MINUTES must be greater than 0".to_string(),
            ));
        }
        if chrono::Duration::try_minutes(self.auth.token_ttl_minutes).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "JWT_ACCESS_TOKEN_EXPIRE_MINUTES is out of range: {}",
                self.auth.token_ttl_minutes
            )));
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "JWT_SECRET_KEY cannot be empty".to_string(),
            ));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(ConfigError::ValidationError(format!(
                "BCRYPT_COST must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            )));
        }
        Ok(())
    }
}

/// Only HMAC algorithms make sense with a shared secret.
fn parse_algorithm(name: &str) -> Result<Algorithm, ConfigError> {
    let algorithm = Algorithm::from_str(name.trim()).map_err(|_| {
        ConfigError::ValidationError(format!("Unknown JWT_ALGORITHM: {name}"))
    })?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        other => Err(ConfigError::ValidationError(format!(
            "JWT_ALGORITHM must be an HMAC algorithm, got {other:?}"
        ))),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
