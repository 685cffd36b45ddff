mod todo;
mod user;

pub use todo::*;
pub use user::*;
