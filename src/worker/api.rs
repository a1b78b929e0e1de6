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

use crate::task::{State, Task, TaskEvent};

use super::types::{ErrResponse, SharedWorker};

/// HTTP surface of the worker agent.
pub struct Api {
    pub address: String,
    pub port: u16,
    pub worker: SharedWorker,
}

impl Api {
    pub fn new(address: &str, port: u16, worker: SharedWorker) -> Self {
        Api {
            address: address.to_string(),
            port,
            worker,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/tasks", get(get_tasks))
            .route("/tasks", post(start_task))
            .route("/tasks/{id}", delete(stop_task))
            .route("/stats", get(get_stats))
            .with_state(self.worker.clone())
    }

    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let addr = format!("{}:{}", self.address, self.port);
        let router = self.router();
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "worker api listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
    }
}

async fn get_tasks(AxumState(worker): AxumState<SharedWorker>) -> Json<Vec<Task>> {
    let tasks = worker.lock().await.get_tasks();
    Json(tasks)
}

/// Intake: enqueue the event's task snapshot for the execution loop.
async fn start_task(
    AxumState(worker): AxumState<SharedWorker>,
    payload: Result<Json<TaskEvent>, JsonRejection>,
) -> Response {
    let Json(event) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            warn!(error = %rejection, "undecodable task event");
            return bad_request(rejection.to_string());
        }
    };

    info!(task_id = %event.task.id, desired = %event.state, "task queued");
    let task = event.task.clone();
    worker.lock().await.add_task(event.task);
    (StatusCode::CREATED, Json(task)).into_response()
}

/// Operator stop: re-enqueue the persisted task with a Completed intent.
async fn stop_task(
    AxumState(worker): AxumState<SharedWorker>,
    Path(id): Path<String>,
) -> Response {
    let Ok(task_id) = Uuid::parse_str(&id) else {
        return bad_request(format!("{id} is not a valid task id"));
    };

    let mut guard = worker.lock().await;
    let mut task = match guard.db.get(&task_id.to_string()) {
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

    task.state = State::Completed;
    guard.add_task(task);
    info!(task_id = %task_id, "task queued to stop");
    StatusCode::NO_CONTENT.into_response()
}

async fn get_stats(AxumState(worker): AxumState<SharedWorker>) -> Json<super::stats::Stats> {
    let mut guard = worker.lock().await;
    if guard.stats.is_none() {
        guard.sample_stats();
    }
    Json(guard.stats.clone().unwrap_or_default())
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
