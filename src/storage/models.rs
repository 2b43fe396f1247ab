use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// When the identity was registered
    pub created_at: DateTime<Utc>,
    /// Disabled identities cannot pass the bearer guard
    pub disabled: bool,
    /// Unique across all identities
    pub email: String,
    /// Store-assigned, monotonic
    pub id: u64,
    /// bcrypt modular-crypt string, never the plaintext
    pub password_hash: String,
    /// Unique across all identities; the token subject
    pub username: String,
}

/// The externally visible view of an identity (no hash, no id)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub disabled: bool,
    pub email: String,
    pub username: String,
}

impl Identity {
    pub fn public(&self) -> PublicUser {
        PublicUser {
            disabled: self.disabled,
            email: self.email.clone(),
            username: self.username.clone(),
        }
    }
}

/// Sparse identity update, as written to the store. `password_hash` is
/// already hashed by the time it gets here.
#[derive(Debug, Clone, Default)]
pub struct IdentityChanges {
    pub disabled: Option<bool>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub username: Option<String>,
}

impl IdentityChanges {
    pub fn is_empty(&self) -> bool {
        self.disabled.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.username.is_none()
    }
}

/// Which unique index rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueKey {
    Email,
    Username,
}

impl std::fmt::Display for UniqueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueKey::Email => f.write_str("email"),
            UniqueKey::Username => f.write_str("username"),
        }
    }
}

/// A book record, owned by the book service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub author: String,
    /// Assigned by the book service
    pub id: i64,
    pub title: String,
    pub year: i32,
}

/// Book fields supplied on creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBook {
    pub author: String,
    pub title: String,
    pub year: i32,
}

impl NewBook {
    pub fn into_book(self, id: i64) -> Book {
        Book {
            author: self.author,
            id,
            title: self.title,
            year: self.year,
        }
    }
}
