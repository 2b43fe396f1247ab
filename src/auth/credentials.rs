//! Credential store: identity lookups and writes on top of the identity
//! database, with password hashing applied on the way in.

use thiserror::Error;

use crate::storage::models::{Identity, IdentityChanges, UniqueKey};
use crate::storage::{Database, DatabaseError};

use super::password::{PasswordError, PasswordHasher};

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Database error: {0}")]
    Database(DatabaseError),
    #[error("Email already registered")]
    DuplicateEmail,
    #[error("Username already registered")]
    DuplicateUsername,
    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl From<DatabaseError> for CredentialError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::Conflict(UniqueKey::Username) => CredentialError::DuplicateUsername,
            DatabaseError::Conflict(UniqueKey::Email) => CredentialError::DuplicateEmail,
            other => CredentialError::Database(other),
        }
    }
}

/// Sparse update with a plaintext password, hashed before it is stored.
#[derive(Debug, Clone, Default)]
pub struct IdentityUpdate {
    pub disabled: Option<bool>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub username: Option<String>,
}

pub fn find_by_username(db: &Database, username: &str) -> Result<Option<Identity>, CredentialError> {
    Ok(db.get_identity_by_username(username)?)
}

pub fn find_by_email(db: &Database, email: &str) -> Result<Option<Identity>, CredentialError> {
    Ok(db.get_identity_by_email(email)?)
}

pub fn find_by_id(db: &Database, id: u64) -> Result<Option<Identity>, CredentialError> {
    Ok(db.get_identity(id)?)
}

/// Register a new identity.
pub fn create(
    db: &Database,
    hasher: &PasswordHasher,
    username: &str,
    email: &str,
    password: &str,
) -> Result<Identity, CredentialError> {
    let password_hash = hasher.hash(password)?;
    let identity = db.insert_identity(username, email, &password_hash)?;

    tracing::debug!(id = identity.id, username = %identity.username, "Created identity");
    Ok(identity)
}

/// Apply a sparse update. `None` when the id is unknown or `update` is empty.
pub fn update(
    db: &Database,
    hasher: &PasswordHasher,
    id: u64,
    update: IdentityUpdate,
) -> Result<Option<Identity>, CredentialError> {
    let password_hash = update
        .password
        .as_deref()
        .map(|p| hasher.hash(p))
        .transpose()?;

    let changes = IdentityChanges {
        disabled: update.disabled,
        email: update.email,
        password_hash,
        username: update.username,
    };

    let updated = db.update_identity(id, &changes)?;
    if let Some(identity) = &updated {
        tracing::debug!(id = identity.id, "Updated identity");
    }
    Ok(updated)
}
