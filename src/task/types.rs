use std::collections::HashMap;

use bollard::secret::PortMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task. Transitions are validated by
/// [`valid_state_transition`](super::state::valid_state_transition).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl State {
    /// Completed and Failed tasks never leave their state through the
    /// transition table.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::Completed | State::Failed)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            State::Pending => "Pending",
            State::Scheduled => "Scheduled",
            State::Running => "Running",
            State::Completed => "Completed",
            State::Failed => "Failed",
        };
        f.pad(s)
    }
}

/// The unit of work: a single container the user wants running somewhere in
/// the cluster.
///
/// `memory` is in MiB and `disk` in GiB; the scheduler compares `memory`
/// against node capacity in the same unit. `bound_worker` records the
/// worker the task was placed on so the manager can rebuild its binding
/// tables after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Task {
    #[serde(alias = "ID")]
    pub id: Uuid,
    pub name: String,
    pub state: State,
    pub image: String,
    pub memory: u64,
    pub disk: u64,
    pub exposed_ports: Vec<String>,
    pub port_bindings: HashMap<String, String>,
    pub restart_policy: String,
    pub health_check: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    #[serde(alias = "ContainerID")]
    pub container_id: Option<String>,
    pub host_ports: Option<PortMap>,
    pub bound_worker: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub restart_count: u32,
}

impl Default for Task {
    fn default() -> Self {
        Task {
            id: Uuid::new_v4(),
            name: String::new(),
            state: State::Pending,
            image: String::new(),
            memory: 0,
            disk: 0,
            exposed_ports: Vec::new(),
            port_bindings: HashMap::new(),
            restart_policy: String::new(),
            health_check: String::new(),
            cmd: Vec::new(),
            env: Vec::new(),
            container_id: None,
            host_ports: None,
            bound_worker: None,
            start_time: None,
            finish_time: None,
            restart_count: 0,
        }
    }
}

impl Task {
    /// First host port the runtime mapped for this task, if any is known.
    pub fn first_host_port(&self) -> Option<String> {
        let ports = self.host_ports.as_ref()?;
        ports
            .values()
            .flatten()
            .flatten()
            .find_map(|binding| binding.host_port.clone())
    }
}

/// A request to move a task toward a desired state. Events are recorded in
/// the event store on intake and on dispatch, and are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskEvent {
    #[serde(default = "Uuid::new_v4", alias = "ID")]
    pub id: Uuid,
    #[serde(default)]
    pub state: State,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub task: Task,
}

impl TaskEvent {
    pub fn new(state: State, task: Task) -> Self {
        TaskEvent {
            id: Uuid::new_v4(),
            state,
            timestamp: Utc::now(),
            task,
        }
    }
}

/// Container configuration handed to the runtime driver, derived from the
/// declarative half of a [`Task`].
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub name: String,
    pub image: String,
    /// Memory limit in MiB; 0 means unlimited.
    pub memory: u64,
    pub disk: u64,
    pub exposed_ports: Vec<String>,
    pub port_bindings: HashMap<String, String>,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub restart_policy: String,
}

pub fn new_config(task: &Task) -> Config {
    Config {
        name: task.name.clone(),
        image: task.image.clone(),
        memory: task.memory,
        disk: task.disk,
        exposed_ports: task.exposed_ports.clone(),
        port_bindings: task.port_bindings.clone(),
        cmd: task.cmd.clone(),
        env: task.env.clone(),
        restart_policy: task.restart_policy.clone(),
    }
}
