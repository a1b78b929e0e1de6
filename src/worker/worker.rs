use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bollard::secret::ContainerStateStatusEnum;
use chrono::Utc;
use sysinfo::System;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::store::{new_store, Store, StoreError};
use crate::task::{new_config, valid_state_transition, DockerClient, State, Task};

use super::stats::get_stats;
use super::types::{SharedWorker, Worker, WorkerError};

const RUN_INTERVAL: Duration = Duration::from_secs(10);
const UPDATE_INTERVAL: Duration = Duration::from_secs(15);
const STATS_INTERVAL: Duration = Duration::from_secs(15);

impl Worker {
    pub fn new(name: &str, db_type: &str) -> Result<Self, StoreError> {
        let db: Arc<dyn Store<Task>> = new_store(db_type, "tasks")?.into();
        Ok(Worker {
            name: name.to_string(),
            queue: VecDeque::new(),
            db,
            sys: System::new_all(),
            stats: None,
        })
    }

    /// Enqueue a task intent for the execution loop.
    pub fn add_task(&mut self, task: Task) {
        self.queue.push_back(task);
    }

    pub fn get_tasks(&self) -> Vec<Task> {
        match self.db.list() {
            Ok(tasks) => tasks,
            Err(err) => {
                error!(error = %err, "listing tasks failed");
                Vec::new()
            }
        }
    }

    /// Refresh the host sample and cache it for the stats endpoint.
    pub fn sample_stats(&mut self) {
        self.sys.refresh_all();
        let task_count = self.db.count().unwrap_or(0) as u64;
        self.stats = Some(get_stats(&self.sys, task_count));
    }
}

/// Process the head of the queue, if any: load the persisted copy, enforce
/// the transition table, then hand the intent to the runtime driver.
pub async fn run_next(worker: &SharedWorker) -> Result<(), WorkerError> {
    let (queued, db) = {
        let mut guard = worker.lock().await;
        (guard.queue.pop_front(), guard.db.clone())
    };
    let Some(queued) = queued else {
        debug!("no tasks in queue");
        return Ok(());
    };

    let key = queued.id.to_string();
    let persisted = match db.get(&key) {
        Ok(task) => task,
        Err(StoreError::NotFound(_)) => {
            db.put(&key, queued.clone())?;
            queued.clone()
        }
        Err(err) => return Err(err.into()),
    };

    if !valid_state_transition(&persisted.state, &queued.state) {
        return Err(WorkerError::InvalidTransition {
            from: persisted.state,
            to: queued.state,
        });
    }

    match queued.state {
        State::Scheduled => start_task(&db, queued).await,
        State::Completed => stop_task(&db, queued).await,
        other => Err(WorkerError::UnexpectedState(other)),
    }
}

async fn start_task(db: &Arc<dyn Store<Task>>, mut task: Task) -> Result<(), WorkerError> {
    task.start_time = Some(Utc::now());
    let config = new_config(&task);
    let key = task.id.to_string();

    let run = async {
        let docker = DockerClient::connect()?;
        docker.run(&config).await
    };

    match run.await {
        Ok(container_id) => {
            info!(task_id = %task.id, container_id = %container_id, "task running");
            task.container_id = Some(container_id);
            task.state = State::Running;
            db.put(&key, task)?;
            Ok(())
        }
        Err(err) => {
            error!(task_id = %task.id, error = %err, "starting task failed");
            task.state = State::Failed;
            db.put(&key, task)?;
            Err(err.into())
        }
    }
}

/// Completed records operator intent, so the task is marked done even when
/// the runtime refuses the stop.
async fn stop_task(db: &Arc<dyn Store<Task>>, mut task: Task) -> Result<(), WorkerError> {
    if let Some(container_id) = task.container_id.clone() {
        match DockerClient::connect() {
            Ok(docker) => {
                if let Err(err) = docker.stop(&container_id).await {
                    warn!(task_id = %task.id, error = %err, "stopping container failed");
                }
            }
            Err(err) => warn!(task_id = %task.id, error = %err, "runtime unreachable on stop"),
        }
    }

    task.finish_time = Some(Utc::now());
    task.state = State::Completed;
    info!(task_id = %task.id, "task stopped");
    db.put(&task.id.to_string(), task)?;
    Ok(())
}

/// Bring persisted state in line with what the runtime actually reports:
/// a Running task whose container is gone or exited has failed, and live
/// containers refresh the task's host-port map.
async fn reconcile_tasks(db: &Arc<dyn Store<Task>>) -> Result<(), WorkerError> {
    let docker = DockerClient::connect()?;

    for mut task in db.list()? {
        if task.state != State::Running {
            continue;
        }
        let Some(container_id) = task.container_id.clone() else {
            continue;
        };

        match docker.inspect(&container_id).await {
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "inspect failed");
                continue;
            }
            Ok(None) => {
                warn!(task_id = %task.id, container_id, "container missing, marking failed");
                task.state = State::Failed;
                db.put(&task.id.to_string(), task)?;
            }
            Ok(Some(container)) => {
                let status = container.state.and_then(|state| state.status);
                if status == Some(ContainerStateStatusEnum::EXITED) {
                    warn!(task_id = %task.id, container_id, "container exited, marking failed");
                    task.state = State::Failed;
                    db.put(&task.id.to_string(), task)?;
                    continue;
                }
                task.host_ports = container
                    .network_settings
                    .and_then(|settings| settings.ports);
                db.put(&task.id.to_string(), task)?;
            }
        }
    }
    Ok(())
}

/// Execution loop: every 10 s handle at most one queued intent.
pub async fn run_tasks(worker: SharedWorker, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Err(err) = run_next(&worker).await {
            error!(error = %err, "error running task");
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(RUN_INTERVAL) => {}
        }
    }
    info!("execution loop stopped");
}

/// Reconciliation loop: every 15 s compare persisted Running tasks against
/// the runtime.
pub async fn update_tasks(worker: SharedWorker, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        debug!("checking status of tasks");
        let db = worker.lock().await.db.clone();
        if let Err(err) = reconcile_tasks(&db).await {
            warn!(error = %err, "task reconciliation failed");
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(UPDATE_INTERVAL) => {}
        }
    }
    info!("reconciliation loop stopped");
}

/// Stats loop: every 15 s refresh the cached host sample.
pub async fn collect_stats(worker: SharedWorker, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        worker.lock().await.sample_stats();
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(STATS_INTERVAL) => {}
        }
    }
    info!("stats loop stopped");
}
