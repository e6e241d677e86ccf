pub mod categories;
pub mod common;
pub mod health;
pub mod mail;
pub mod products;
pub mod subcategories;
pub mod users;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;
