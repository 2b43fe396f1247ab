use chrono::Utc;
use redb::ReadableTable;

use super::db::{next_sequence, Database, DatabaseError};
use super::models::{Identity, IdentityChanges, UniqueKey};
use super::tables::*;

const USER_SEQUENCE: &str = "users";

impl Database {
    // ========================================================================
    // Identity operations
    // ========================================================================

    /// Insert a new identity. The uniqueness checks and the insert share one
    /// write transaction, and redb serializes writers, so two concurrent
    /// registrations for the same name cannot both succeed.
    pub fn insert_identity(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<Identity, DatabaseError> {
        debug_assert!(!username.is_empty(), "username must not be empty");
        debug_assert!(!email.is_empty(), "email must not be empty");

        let write_txn = self.begin_write()?;
        let identity = {
            let mut usernames = write_txn.open_table(USERNAMES)?;
            if usernames.get(username)?.is_some() {
                return Err(DatabaseError::Conflict(UniqueKey::Username));
            }

            let mut emails = write_txn.open_table(EMAILS)?;
            if emails.get(email)?.is_some() {
                return Err(DatabaseError::Conflict(UniqueKey::Email));
            }

            let identity = Identity {
                created_at: Utc::now(),
                disabled: false,
                email: email.to_string(),
                id: next_sequence(&write_txn, USER_SEQUENCE)?,
                password_hash: password_hash.to_string(),
                username: username.to_string(),
            };

            let mut users = write_txn.open_table(USERS)?;
            let data = rmp_serde::to_vec_named(&identity)?;
            users.insert(identity.id, data.as_slice())?;
            usernames.insert(username, identity.id)?;
            emails.insert(email, identity.id)?;

            identity
        };
        write_txn.commit()?;
        Ok(identity)
    }

    /// Get an identity by its store id
    pub fn get_identity(&self, id: u64) -> Result<Option<Identity>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        match table.get(id)? {
            Some(data) => {
                let identity: Identity = rmp_serde::from_slice(data.value())?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// Get an identity by username (resolves username -> id -> identity)
    pub fn get_identity_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Identity>, DatabaseError> {
        let id = {
            let read_txn = self.begin_read()?;
            let index = read_txn.open_table(USERNAMES)?;
            let result = index.get(username)?.map(|v| v.value());
            result
        };

        match id {
            Some(id) => self.get_identity(id),
            None => Ok(None),
        }
    }

    /// Get an identity by email (resolves email -> id -> identity)
    pub fn get_identity_by_email(&self, email: &str) -> Result<Option<Identity>, DatabaseError> {
        let id = {
            let read_txn = self.begin_read()?;
            let index = read_txn.open_table(EMAILS)?;
            let result = index.get(email)?.map(|v| v.value());
            result
        };

        match id {
            Some(id) => self.get_identity(id),
            None => Ok(None),
        }
    }

    /// Apply a sparse update. Returns `None` when the id is unknown or no
    /// field was supplied.
    pub fn update_identity(
        &self,
        id: u64,
        changes: &IdentityChanges,
    ) -> Result<Option<Identity>, DatabaseError> {
        if changes.is_empty() {
            return Ok(None);
        }

        let write_txn = self.begin_write()?;

        let existing: Option<Identity> = {
            let table = write_txn.open_table(USERS)?;
            let result = match table.get(id)? {
                Some(data) => Some(rmp_serde::from_slice::<Identity>(data.value())?),
                None => None,
            };
            result
        };

        let Some(mut identity) = existing else {
            return Ok(None);
        };

        if let Some(username) = changes.username.as_deref() {
            if username != identity.username {
                let mut index = write_txn.open_table(USERNAMES)?;
                if index.get(username)?.is_some() {
                    return Err(DatabaseError::Conflict(UniqueKey::Username));
                }
                index.remove(identity.username.as_str())?;
                index.insert(username, id)?;
                identity.username = username.to_string();
            }
        }

        if let Some(email) = changes.email.as_deref() {
            if email != identity.email {
                let mut index = write_txn.open_table(EMAILS)?;
                if index.get(email)?.is_some() {
                    return Err(DatabaseError::Conflict(UniqueKey::Email));
                }
                index.remove(identity.email.as_str())?;
                index.insert(email, id)?;
                identity.email = email.to_string();
            }
        }

        if let Some(disabled) = changes.disabled {
            identity.disabled = disabled;
        }
        if let Some(hash) = &changes.password_hash {
            identity.password_hash = hash.clone();
        }

        {
            let mut table = write_txn.open_table(USERS)?;
            let data = rmp_serde::to_vec_named(&identity)?;
            table.insert(id, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(Some(identity))
    }
}
