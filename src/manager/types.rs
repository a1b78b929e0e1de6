use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::node::Node;
use crate::scheduler::Scheduler;
use crate::store::{Store, StoreError};
use crate::task::{Task, TaskEvent};

/// Handle shared between the manager's loops and its HTTP server.
pub type SharedManager = Arc<Mutex<Manager>>;

/// The control plane for the cluster: the pending event queue, the task
/// and event stores, the per-worker capacity cache, and the binding
/// tables.
///
/// Binding invariant: a task id appears in `task_worker_map` iff it
/// appears in exactly one worker's bucket of `worker_task_map`, and a task
/// is bound at most once for its lifetime. The surrounding mutex is the
/// single coarse lock guarding the queue, the maps, and the node cache;
/// the stores serialize themselves.
pub struct Manager {
    pub pending: VecDeque<TaskEvent>,
    pub task_db: Arc<dyn Store<Task>>,
    pub event_db: Arc<dyn Store<TaskEvent>>,
    pub workers: Vec<String>,
    pub worker_nodes: Vec<Node>,
    pub worker_task_map: HashMap<String, Vec<Uuid>>,
    pub task_worker_map: HashMap<Uuid, String>,
    pub scheduler: Box<dyn Scheduler>,
    pub client: reqwest::Client,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("no available candidates match the resource request for task {0}")]
    Infeasible(Uuid),
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response status {status}: {message}")]
    Protocol { status: u16, message: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
