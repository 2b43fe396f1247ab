//! The book service: answers the four book RPCs from its own store.

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::StorageConfig;
use crate::rpc::{self, Handler, Request, Response, ServerOptions, ShutdownOutcome, Status};
use crate::storage::models::NewBook;
use crate::storage::{sample_books, Database, DatabaseError, Store};

/// Open the book store, seeding it with sample books when it is empty and
/// seeding is enabled.
pub fn open_store(config: &StorageConfig) -> Result<Database, DatabaseError> {
    let db = Database::open(&config.books_data_dir, Store::Books)?;

    if config.seed_books {
        let seeded = db.seed_books(&sample_books())?;
        if seeded > 0 {
            info!(count = seeded, "Seeded empty book store with sample books");
        }
    }

    Ok(db)
}

/// Serve book RPCs on `listener` until `shutdown` resolves.
pub async fn run<F>(
    listener: TcpListener,
    db: Database,
    options: ServerOptions,
    shutdown: F,
) -> ShutdownOutcome
where
    F: Future<Output = ()>,
{
    rpc::serve(listener, Arc::new(BookService::new(db)), options, shutdown).await
}

#[derive(Debug, Clone)]
pub struct BookService {
    db: Database,
}

impl BookService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn get_book(&self, id: i64) -> Response {
        match self.blocking(move |db| db.get_book(id)).await {
            Ok(Some(book)) => Response::Book(book),
            Ok(None) => Response::Status(Status::not_found(not_found_message(id))),
            Err(status) => Response::Status(status),
        }
    }

    async fn list_books(&self) -> Response {
        match self.blocking(|db| db.list_books()).await {
            Ok(books) => Response::Books(books),
            Err(status) => Response::Status(status),
        }
    }

    async fn add_book(&self, book: NewBook) -> Response {
        match self.blocking(move |db| db.insert_book(book)).await {
            Ok(book) => {
                info!(id = book.id, title = %book.title, "Added book");
                Response::Book(book)
            }
            Err(status) => Response::Status(status),
        }
    }

    async fn delete_book(&self, id: i64) -> Response {
        match self.blocking(move |db| db.delete_book(id)).await {
            Ok(true) => {
                info!(id, "Deleted book");
                Response::Deleted {
                    success: true,
                    message: format!("Book with ID {id} deleted successfully"),
                }
            }
            Ok(false) => Response::Status(Status::not_found(not_found_message(id))),
            Err(status) => Response::Status(status),
        }
    }

    /// Run a store operation on the blocking pool. Failures are logged here
    /// and reported to the caller as an opaque `Internal` status.
    async fn blocking<T, F>(&self, op: F) -> Result<T, Status>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
    {
        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || op(&db)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                error!(error = %e, "Book store operation failed");
                Err(Status::internal("Internal server error"))
            }
            Err(e) => {
                error!(error = %e, "Book store task failed");
                Err(Status::internal("Internal server error"))
            }
        }
    }
}

impl Handler for BookService {
    async fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetBook { id } => self.get_book(id).await,
            Request::ListBooks => self.list_books().await,
            Request::AddBook(book) => self.add_book(book).await,
            Request::DeleteBook { id } => self.delete_book(id).await,
            Request::Ping => Response::Pong,
        }
    }
}

fn not_found_message(id: i64) -> String {
    format!("Book with ID {id} not found")
}
