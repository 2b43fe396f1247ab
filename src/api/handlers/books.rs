//! REST handlers that forward to the book service. Every handler takes
//! [`ActiveUser`] first, so the bearer guard runs before any backend call.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use crate::api::extract::ActiveUser;
use crate::api::response::{ApiError, AppJson, AppPath};
use crate::books::DeleteOutcome;
use crate::storage::models::{Book, NewBook};
use crate::AppState;

pub async fn list_books(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
) -> Result<Json<Vec<Book>>, ApiError> {
    let books = state.books.list().await?;
    tracing::debug!(username = %user.username, count = books.len(), "Listed books");
    Ok(Json(books))
}

pub async fn get_book(
    State(state): State<Arc<AppState>>,
    ActiveUser(_user): ActiveUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Book>, ApiError> {
    let book = state.books.get(id).await?;
    Ok(Json(book))
}

pub async fn create_book(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    AppJson(book): AppJson<NewBook>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let book = state.books.create(book).await?;
    tracing::info!(id = book.id, username = %user.username, "Created book");
    Ok((StatusCode::CREATED, Json(book)))
}

pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    ActiveUser(user): ActiveUser,
    AppPath(id): AppPath<i64>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let outcome = state.books.delete(id).await?;
    tracing::info!(id, username = %user.username, "Deleted book");
    Ok(Json(outcome))
}
