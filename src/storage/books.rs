use redb::ReadableTable;

use super::db::{next_sequence, Database, DatabaseError};
use super::models::{Book, NewBook};
use super::tables::*;

const BOOK_SEQUENCE: &str = "books";

/// Books written into an empty store on first start.
pub fn sample_books() -> Vec<NewBook> {
    [
        ("Pride and Prejudice", "Jane Austen", 1813),
        ("1984", "George Orwell", 1949),
        ("To Kill a Mockingbird", "Harper Lee", 1960),
    ]
    .into_iter()
    .map(|(title, author, year)| NewBook {
        author: author.to_string(),
        title: title.to_string(),
        year,
    })
    .collect()
}

impl Database {
    // ========================================================================
    // Book operations
    // ========================================================================

    /// Insert a book and return it with its newly assigned id
    pub fn insert_book(&self, book: NewBook) -> Result<Book, DatabaseError> {
        let write_txn = self.begin_write()?;
        let book = {
            let id = next_sequence(&write_txn, BOOK_SEQUENCE)? as i64;
            let book = book.into_book(id);
            let mut table = write_txn.open_table(BOOKS)?;
            let data = rmp_serde::to_vec_named(&book)?;
            table.insert(id, data.as_slice())?;
            book
        };
        write_txn.commit()?;

        tracing::debug!(id = book.id, "Inserted book");
        Ok(book)
    }

    /// Get a book by id
    pub fn get_book(&self, id: i64) -> Result<Option<Book>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(BOOKS)?;

        match table.get(id)? {
            Some(data) => {
                let book: Book = rmp_serde::from_slice(data.value())?;
                Ok(Some(book))
            }
            None => Ok(None),
        }
    }

    /// All books in id order, which is insertion order
    pub fn list_books(&self) -> Result<Vec<Book>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(BOOKS)?;

        let mut books = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let book: Book = rmp_serde::from_slice(value.value())?;
            books.push(book);
        }

        Ok(books)
    }

    /// Delete a book. Returns false when no such id exists.
    pub fn delete_book(&self, id: i64) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(BOOKS)?;
            let removed = table.remove(id)?.is_some();
            removed
        };
        write_txn.commit()?;

        if deleted {
            tracing::debug!(id, "Deleted book");
        }
        Ok(deleted)
    }

    /// Insert `books` only if the table is empty. Returns how many were written.
    pub fn seed_books(&self, books: &[NewBook]) -> Result<usize, DatabaseError> {
        let write_txn = self.begin_write()?;
        let seeded = {
            let mut table = write_txn.open_table(BOOKS)?;
            let empty = table.first()?.is_none();
            if empty {
                for book in books {
                    let id = next_sequence(&write_txn, BOOK_SEQUENCE)? as i64;
                    let data = rmp_serde::to_vec_named(&book.clone().into_book(id))?;
                    table.insert(id, data.as_slice())?;
                }
                books.len()
            } else {
                0
            }
        };
        write_txn.commit()?;
        Ok(seeded)
    }
}
