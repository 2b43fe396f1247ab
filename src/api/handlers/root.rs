use axum::Json;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct IndexResponse {
    pub endpoints: BTreeMap<&'static str, BTreeMap<&'static str, &'static str>>,
    pub message: &'static str,
}

/// Service banner and endpoint index
pub async fn index() -> Json<IndexResponse> {
    let authentication = BTreeMap::from([
        ("POST /register", "Register a new user"),
        ("POST /login", "Get access token"),
        ("GET /users/me", "Get current user info"),
    ]);
    let books = BTreeMap::from([
        ("GET /books", "List all books"),
        ("GET /books/{book_id}", "Get a book by ID"),
        ("POST /books", "Add a new book"),
        ("DELETE /books/{book_id}", "Delete a book by ID"),
    ]);

    Json(IndexResponse {
        endpoints: BTreeMap::from([("Authentication", authentication), ("Books", books)]),
        message: "Welcome to the Book Service API Gateway",
    })
}
