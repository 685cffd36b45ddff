use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::{CreateTodoRequest, Todo, TodoStatus, UpdateTodoRequest},
    state::AppState,
};

pub async fn list_todos(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<serde_json::Value>, AppError> {
    let todos = sqlx::query_as::<_, Todo>(
        "SELECT * FROM todos WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&user_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(json!({ "todos": todos })))
}

pub async fn create_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<CreateTodoRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = req.title.as_deref().map(str::trim).unwrap_or("");
    if title.is_empty() {
        return Err(AppError::Validation("Title is required".into()));
    }

    let now = Utc::now();
    let todo = Todo {
        id: Uuid::new_v4().to_string(),
        user_id,
        title: title.to_string(),
        description: req.description.map(|d| d.trim().to_string()),
        status: TodoStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO todos (id, user_id, title, description, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&todo.id)
    .bind(&todo.user_id)
    .bind(&todo.title)
    .bind(&todo.description)
    .bind(todo.status)
    .bind(todo.created_at)
    .bind(todo.updated_at)
    .execute(&state.pool)
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "todo": todo }))))
}

pub async fn get_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let todo = sqlx::query_as::<_, Todo>("SELECT * FROM todos WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::TodoNotFound)?;

    Ok(Json(json!({ "todo": todo })))
}

pub async fn update_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateTodoRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let title = match req.title {
        Some(title) => {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(AppError::Validation("Title is required".into()));
            }
            Some(title)
        }
        None => None,
    };
    let description = req.description.map(|d| d.trim().to_string());

    let updated = sqlx::query(
        "UPDATE todos
        SET title = COALESCE(?, title),
            description = COALESCE(?, description),
            status = COALESCE(?, status),
            updated_at = ?
        WHERE id = ? AND user_id = ?",
    )
    .bind(title)
    .bind(description)
    .bind(req.status)
    .bind(Utc::now())
    .bind(&id)
    .bind(&user_id)
    .execute(&state.pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::TodoNotFound);
    }

    let todo = sqlx::query_as::<_, Todo>("SELECT * FROM todos WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::TodoNotFound)?;

    Ok(Json(json!({ "todo": todo })))
}

pub async fn delete_todo(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = sqlx::query("DELETE FROM todos WHERE id = ? AND user_id = ?")
        .bind(&id)
        .bind(&user_id)
        .execute(&state.pool)
        .await?;

    if deleted.rows_affected() == 0 {
        return Err(AppError::TodoNotFound);
    }

    Ok(Json(json!({ "success": true })))
}
