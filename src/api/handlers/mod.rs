mod auth;
mod books;
mod root;

pub use auth::{login, read_current_user, register};
pub use books::{create_book, delete_book, get_book, list_books};
pub use root::index;
