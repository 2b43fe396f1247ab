//! Typed client for the book service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RpcConfig;
use crate::rpc::{ChannelOptions, Request, Response, RpcChannel, Status, StatusCode, TransportError};
use crate::storage::models::{Book, NewBook};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Book with ID {0} not found")]
    NotFound(i64),
    /// Anything else that went wrong between here and the book store
    #[error("Book service unavailable: {0}")]
    BackendUnavailable(String),
}

impl From<TransportError> for RecordError {
    fn from(e: TransportError) -> Self {
        RecordError::BackendUnavailable(e.to_string())
    }
}

/// Result of a delete, echoed to REST callers as is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub message: String,
    pub success: bool,
}

/// Clones share one underlying channel.
#[derive(Debug, Clone)]
pub struct RecordClient {
    channel: RpcChannel,
}

impl RecordClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }

    /// Build the client for the configured backend. Connects on first use.
    pub fn connect(config: &RpcConfig) -> Self {
        let channel = RpcChannel::new(config.target_address(), ChannelOptions::from_config(config));
        tracing::info!(addr = %channel.addr(), "Book service channel configured");
        Self::new(channel)
    }

    pub async fn list(&self) -> Result<Vec<Book>, RecordError> {
        match self.channel.call(Request::ListBooks).await? {
            Response::Books(books) => Ok(books),
            other => Err(unexpected(other, None)),
        }
    }

    pub async fn get(&self, id: i64) -> Result<Book, RecordError> {
        match self.channel.call(Request::GetBook { id }).await? {
            Response::Book(book) => Ok(book),
            other => Err(unexpected(other, Some(id))),
        }
    }

    pub async fn create(&self, book: NewBook) -> Result<Book, RecordError> {
        match self.channel.call(Request::AddBook(book)).await? {
            Response::Book(book) => Ok(book),
            other => Err(unexpected(other, None)),
        }
    }

    pub async fn delete(&self, id: i64) -> Result<DeleteOutcome, RecordError> {
        match self.channel.call(Request::DeleteBook { id }).await? {
            Response::Deleted { success: true, message } => Ok(DeleteOutcome {
                message,
                success: true,
            }),
            Response::Deleted { success: false, .. } => Err(RecordError::NotFound(id)),
            other => Err(unexpected(other, Some(id))),
        }
    }
}

/// Map a response that is not the expected success variant. `NotFound` is
/// only meaningful for calls that address a single book.
fn unexpected(response: Response, id: Option<i64>) -> RecordError {
    match (response, id) {
        (
            Response::Status(Status {
                code: StatusCode::NotFound,
                ..
            }),
            Some(id),
        ) => RecordError::NotFound(id),
        (Response::Status(status), _) => RecordError::BackendUnavailable(status.to_string()),
        (other, _) => RecordError::BackendUnavailable(format!("unexpected response {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{new_book, setup_books_db, start_book_service, test_channel_options};

    #[tokio::test]
    async fn test_crud_against_service() {
        let (db, _temp) = setup_books_db();
        let service = start_book_service(db.clone()).await;
        let client = RecordClient::new(RpcChannel::new(service.addr.to_string(), test_channel_options()));

        assert!(client.list().await.unwrap().is_empty());

        let created = client.create(new_book("Dune", "Frank Herbert", 1965)).await.unwrap();
        assert_eq!(client.get(created.id).await.unwrap(), created);
        assert_eq!(client.list().await.unwrap(), vec![created.clone()]);

        let outcome = client.delete(created.id).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            outcome.message,
            format!("Book with ID {} deleted successfully", created.id)
        );
        assert!(db.list_books().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_not_found() {
        let (db, _temp) = setup_books_db();
        let service = start_book_service(db).await;
        let client = RecordClient::new(RpcChannel::new(service.addr.to_string(), test_channel_options()));

        assert!(matches!(client.get(999999).await, Err(RecordError::NotFound(999999))));
        assert!(matches!(client.delete(999999).await, Err(RecordError::NotFound(999999))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = RecordClient::new(RpcChannel::new(addr.to_string(), test_channel_options()));
        assert!(matches!(client.list().await, Err(RecordError::BackendUnavailable(_))));
        assert!(matches!(client.get(1).await, Err(RecordError::BackendUnavailable(_))));
    }

    #[test]
    fn test_status_mapping() {
        let not_found = Response::Status(Status::not_found("gone"));
        assert!(matches!(unexpected(not_found.clone(), Some(5)), RecordError::NotFound(5)));
        assert!(matches!(unexpected(not_found, None), RecordError::BackendUnavailable(_)));
        assert!(matches!(
            unexpected(Response::Status(Status::internal("boom")), Some(5)),
            RecordError::BackendUnavailable(_)
        ));
        assert!(matches!(unexpected(Response::Pong, Some(5)), RecordError::BackendUnavailable(_)));
    }
}
