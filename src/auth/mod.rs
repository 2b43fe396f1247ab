pub mod credentials;
pub mod gateway;
pub mod password;
pub mod token;

pub use gateway::{AccessToken, AuthError, AuthGateway};
pub use password::PasswordHasher;
pub use token::TokenIssuer;
