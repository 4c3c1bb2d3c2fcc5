//! HTTP routes of the task API.
//!
//! # Route Structure
//!
//! ```text
//! GET    /api/todos       - List tasks
//! GET    /api/todos/{id}  - Single task (not implemented)
//! POST   /api/todos       - Create task (not implemented)
//! PUT    /api/todos       - Update task (not implemented)
//! DELETE /api/todos/{id}  - Delete task (not implemented)
//! ```
//!
//! Only the list is backed by data. The other handlers are placeholders
//! that answer `501 Not Implemented`; their request and response shapes
//! are not settled.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use chrono::{DateTime, Utc};

use crate::{error::ApiError, model::Todo};

/// Shared state of the task API.
///
/// The list is fixed at startup; clones share it.
#[derive(Debug, Clone)]
pub struct AppState {
    todos: Arc<[Todo]>,
}

impl AppState {
    /// Creates the state with the single seed task.
    #[must_use]
    pub fn seeded(now: DateTime<Utc>) -> Self {
        Self { todos: Arc::from([Todo::seed(now)]) }
    }

    /// Returns the task list.
    #[must_use]
    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }
}

/// Builds the application router with every route nested under `/api`.
pub fn router(state: AppState) -> Router {
    Router::new().nest("/api", todo_routes()).with_state(state)
}

fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo).put(update_todo))
        .route("/todos/{id}", get(get_todo).delete(delete_todo))
}

async fn list_todos(State(state): State<AppState>) -> Json<Vec<Todo>> {
    let todos = state.todos();
    tracing::debug!(count = todos.len(), "listing todos");
    Json(todos.to_vec())
}

async fn get_todo(Path(id): Path<String>) -> Result<Json<Todo>, ApiError> {
    tracing::debug!(%id, "get todo");
    Err(ApiError::NotImplemented("GET /api/todos/{id}"))
}

async fn create_todo() -> Result<Json<Todo>, ApiError> {
    Err(ApiError::NotImplemented("POST /api/todos"))
}

async fn update_todo() -> Result<Json<Todo>, ApiError> {
    Err(ApiError::NotImplemented("PUT /api/todos"))
}

async fn delete_todo(Path(id): Path<String>) -> Result<Json<bool>, ApiError> {
    tracing::debug!(%id, "delete todo");
    Err(ApiError::NotImplemented("DELETE /api/todos/{id}"))
}
