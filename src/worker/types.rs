use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sysinfo::System;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::store::{Store, StoreError};
use crate::task::{DockerError, State, Task};

use super::stats::Stats;

/// Handle shared between the worker's loops and its HTTP server.
pub type SharedWorker = Arc<Mutex<Worker>>;

/// The agent state for one host: the intake queue, the task store, and the
/// sysinfo handle the stats sampler reads from. The surrounding mutex
/// guards the queue and the cached stats; the store serializes itself.
pub struct Worker {
    pub name: String,
    pub queue: VecDeque<Task>,
    pub db: Arc<dyn Store<Task>>,
    pub sys: System,
    pub stats: Option<Stats>,
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: State, to: State },
    #[error("unexpected desired state {0} for a queued task")]
    UnexpectedState(State),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Docker(#[from] DockerError),
}

/// JSON body for 4xx replies, mirrored by the manager when it decodes a
/// failed dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrResponse {
    #[serde(rename = "HTTPStatusCode")]
    pub http_status_code: u16,
    pub message: String,
}
