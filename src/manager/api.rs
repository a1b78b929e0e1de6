use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State as AxumState};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use crate::node::Node;
use crate::task::{State, Task, TaskEvent};
use crate::worker::ErrResponse;

use super::types::SharedManager;

/// HTTP surface of the manager.
pub struct Api {
    pub address: String,
    pub port: u16,
    pub manager: SharedManager,
}

impl Api {
    pub fn new(address: &str, port: u16, manager: SharedManager) -> Self {
        Api {
            address: address.to_string(),
            port,
            manager,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/tasks", get(get_tasks))
            .route("/tasks", post(add_task))
            .route("/tasks/{id}", delete(stop_task))
            .route("/nodes", get(get_nodes))
            .with_state(self.manager.clone())
    }

    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.address, self.port);
        let router = self.router();
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "manager api listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    }
}

async fn get_tasks(AxumState(manager): AxumState<SharedManager>) -> Json<Vec<Task>> {
    let tasks = manager.lock().await.get_tasks();
    Json(tasks)
}

async fn get_nodes(AxumState(manager): AxumState<SharedManager>) -> Json<Vec<Node>> {
    let nodes = manager.lock().await.worker_nodes.clone();
    Json(nodes)
}

/// Intake: record the event and queue it for the dispatch loop.
async fn add_task(
    AxumState(manager): AxumState<SharedManager>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable task event");
            return bad_request(rejection.to_string());
        }
    };

    let task = event.task.clone();
    info!(event_id = %event.id, task_id = %task.id, desired = %event.state, "task event accepted");

    if let Err(err) = manager.lock().await.add_task(event) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrResponse {
                http_status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                message: err.to_string(),
            }),
        )
            .into_response();
    }

    (StatusCode::CREATED, Json(task)).into_response()
}

/// Operator stop: queue a Completed-intent event for the task.
async fn stop_task(
    AxumState(manager): AxumState<SharedManager>,
    Path(id): Path<String>,
) -> Response {
    let Ok(task_id) = Uuid::parse_str(&id) else {
        return bad_request(format!("{id} is not a valid task id"));
    };

    let mut guard = manager.lock().await;
    let task = match guard.task_db.get(&task_id.to_string()) {
        Ok(task) => task,
        Err(_) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrResponse {
                    http_status_code: StatusCode::NOT_FOUND.as_u16(),
                    message: format!("no task with id {task_id}"),
                }),
            )
                .into_response();
        }
    };

    let event = TaskEvent::new(State::Completed, task);
    info!(task_id = %task_id, "stop requested");

    if let Err(err) = guard.add_task(event) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrResponse {
                http_status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                message: err.to_string(),
            }),
        )
            .into_response();
    }

    StatusCode::NO_CONTENT.into_response()
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrResponse {
            http_status_code: StatusCode::BAD_REQUEST.as_u16(),
            message,
        }),
    )
        .into_response()
}
