//! Registration, login and bearer-token identity resolution.
//!
//! Store access and bcrypt both block, so every call into them is moved
//! onto the blocking pool.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AuthConfig;
use crate::storage::models::{Identity, PublicUser};
use crate::storage::Database;

use super::credentials::{self, CredentialError};
use super::password::PasswordHasher;
use super::token::TokenIssuer;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailTaken,
    #[error("Inactive user")]
    InactiveAccount,
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Incorrect username or password")]
    InvalidCredentials,
    #[error("Could not validate credentials")]
    Unauthenticated,
    #[error("Username already registered")]
    UsernameTaken,
    #[error("{0}")]
    Validation(String),
}

impl From<CredentialError> for AuthError {
    fn from(e: CredentialError) -> Self {
        match e {
            CredentialError::DuplicateUsername => AuthError::UsernameTaken,
            CredentialError::DuplicateEmail => AuthError::EmailTaken,
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AuthError {
    fn from(e: tokio::task::JoinError) -> Self {
        AuthError::Internal(format!("Blocking task failed: {e}"))
    }
}

/// Login response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

impl AccessToken {
    fn bearer(access_token: String) -> Self {
        Self {
            access_token,
            token_type: "bearer".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthGateway {
    db: Database,
    hasher: PasswordHasher,
    token_ttl: Duration,
    tokens: TokenIssuer,
}

impl AuthGateway {
    pub fn new(db: Database, hasher: PasswordHasher, tokens: TokenIssuer, token_ttl: Duration) -> Self {
        Self {
            db,
            hasher,
            token_ttl,
            tokens,
        }
    }

    pub fn from_config(db: Database, config: &AuthConfig) -> Self {
        Self::new(
            db,
            PasswordHasher::new(config.bcrypt_cost),
            TokenIssuer::from_config(config),
            config.token_ttl(),
        )
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, AuthError> {
        validate_registration(username, email, password)?;

        let db = self.db.clone();
        let hasher = self.hasher;
        let (username, email, password) =
            (username.to_string(), email.to_string(), password.to_string());

        let identity = tokio::task::spawn_blocking(move || {
            credentials::create(&db, &hasher, &username, &email, &password)
        })
        .await??;

        tracing::info!(username = %identity.username, "Registered identity");
        Ok(identity.public())
    }

    /// Check a username/password pair and mint a bearer token for it.
    /// Unknown user and wrong password are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &str) -> Result<AccessToken, AuthError> {
        let db = self.db.clone();
        let hasher = self.hasher;
        let (username, password) = (username.to_string(), password.to_string());

        let authenticated = tokio::task::spawn_blocking(move || {
            let Some(identity) = credentials::find_by_username(&db, &username)? else {
                return Ok::<_, CredentialError>(None);
            };
            Ok(hasher
                .verify(&password, &identity.password_hash)
                .then_some(identity))
        })
        .await??;

        let Some(identity) = authenticated else {
            tracing::debug!("Login rejected");
            return Err(AuthError::InvalidCredentials);
        };

        let access_token = self
            .tokens
            .issue(&identity.username, self.token_ttl)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        tracing::debug!(username = %identity.username, "Issued access token");
        Ok(AccessToken::bearer(access_token))
    }

    /// The guard in front of every protected endpoint. The store is consulted
    /// on every call, so disabling an identity takes effect before its
    /// outstanding tokens expire.
    pub async fn require_active_identity(&self, token: &str) -> Result<Identity, AuthError> {
        let subject = self
            .tokens
            .verify(token)
            .map_err(|_| AuthError::Unauthenticated)?;

        let db = self.db.clone();
        let identity = tokio::task::spawn_blocking(move || {
            credentials::find_by_username(&db, &subject)
        })
        .await??
        .ok_or(AuthError::Unauthenticated)?;

        if identity.disabled {
            tracing::debug!(username = %identity.username, "Rejected disabled identity");
            return Err(AuthError::InactiveAccount);
        }

        Ok(identity)
    }
}

fn validate_registration(username: &str, email: &str, password: &str) -> Result<(), AuthError> {
    if username.trim().is_empty() {
        return Err(AuthError::Validation("username is required".to_string()));
    }
    if email.trim().is_empty() {
        return Err(AuthError::Validation("email is required".to_string()));
    }
    // Passwords are taken as given; only the empty one is refused
    if password.is_empty() {
        return Err(AuthError::Validation("password is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::IdentityUpdate;
    use crate::testutil::{fast_hasher, setup_identity_db, test_gateway, TEST_SECRET};
    use jsonwebtoken::Algorithm;

    #[tokio::test]
    async fn test_register_login_resolve() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db);

        let user = gateway.register("alice", "a@x.com", "pw1").await.unwrap();
        assert_eq!(
            user,
            PublicUser {
                disabled: false,
                email: "a@x.com".to_string(),
                username: "alice".to_string(),
            }
        );

        let token = gateway.login("alice", "pw1").await.unwrap();
        assert_eq!(token.token_type, "bearer");

        let identity = gateway
            .require_active_identity(&token.access_token)
            .await
            .unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[tokio::test]
    async fn test_register_twice_is_taken() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db);
        gateway.register("alice", "a@x.com", "pw1").await.unwrap();

        let err = gateway.register("alice", "z@x.com", "zzz").await.unwrap_err();
        assert!(matches!(err, AuthError::UsernameTaken));

        let err = gateway.register("bob", "a@x.com", "pw2").await.unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db);

        for (u, e, p) in [("", "a@x.com", "pw"), ("alice", "  ", "pw"), ("alice", "a@x.com", "")] {
            let err = gateway.register(u, e, p).await.unwrap_err();
            assert!(matches!(err, AuthError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_password_is_not_trimmed() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db);

        gateway.register("alice", "a@x.com", "   ").await.unwrap();
        assert!(gateway.login("alice", "   ").await.is_ok());
        assert!(matches!(
            gateway.login("alice", "").await.unwrap_err(),
            AuthError::InvalidCredentials
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_uniform() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db);
        gateway.register("alice", "a@x.com", "pw1").await.unwrap();

        let wrong_password = gateway.login("alice", "nope").await.unwrap_err();
        let unknown_user = gateway.login("mallory", "pw1").await.unwrap_err();
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[tokio::test]
    async fn test_guard_rejects_disabled_identity() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db.clone());
        gateway.register("alice", "a@x.com", "pw1").await.unwrap();
        let token = gateway.login("alice", "pw1").await.unwrap().access_token;

        let alice = credentials::find_by_username(&db, "alice").unwrap().unwrap();
        credentials::update(
            &db,
            &fast_hasher(),
            alice.id,
            IdentityUpdate {
                disabled: Some(true),
                ..Default::default()
            },
        )
        .unwrap();

        let err = gateway.require_active_identity(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::InactiveAccount));
    }

    #[tokio::test]
    async fn test_guard_rejects_bad_tokens() {
        let (db, _temp) = setup_identity_db();
        let gateway = test_gateway(db);

        let err = gateway.require_active_identity("garbage").await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));

        // Correctly signed, but nobody by that name exists
        let ghost = TokenIssuer::new(TEST_SECRET, Algorithm::HS256)
            .issue("ghost", Duration::minutes(5))
            .unwrap();
        let err = gateway.require_active_identity(&ghost).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthenticated));
    }
}
