mod books;
pub mod db;
pub mod models;
mod tables;
mod users;

pub use books::sample_books;
pub use db::{Database, DatabaseError, Store};
pub use tables::*;
