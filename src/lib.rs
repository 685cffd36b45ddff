pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;
pub mod wallet;

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use handlers::{
    create_todo, delete_todo, get_todo, list_todos, login, logout, me, signup, update_todo,
    wallet_nonce, wallet_verify,
};
use state::AppState;

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/wallet/nonce", post(wallet_nonce))
        .route("/api/auth/wallet/verify", post(wallet_verify))
        .route("/api/todos", get(list_todos))
        .route("/api/todos", post(create_todo))
        .route("/api/todos/:id", get(get_todo))
        .route("/api/todos/:id", put(update_todo))
        .route("/api/todos/:id", delete(delete_todo))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
