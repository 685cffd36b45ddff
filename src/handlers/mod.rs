mod auth;
mod todos;

pub use auth::*;
pub use todos::*;
