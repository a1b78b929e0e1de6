use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::node::Node;
use crate::scheduler::new_scheduler;
use crate::store::{new_store, Store, StoreError};
use crate::task::{valid_state_transition, State, Task, TaskEvent};
use crate::utils::with_retry;
use crate::worker::ErrResponse;

use super::types::{Manager, ManagerError, SharedManager};

const DISPATCH_INTERVAL: Duration = Duration::from_secs(10);
const UPDATE_INTERVAL: Duration = Duration::from_secs(15);
const HEALTH_INTERVAL: Duration = Duration::from_secs(60);
const STATS_INTERVAL: Duration = Duration::from_secs(15);

/// Automatic restarts per task, for its whole lifetime.
const RESTART_BUDGET: u32 = 3;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

impl Manager {
    pub fn new(
        workers: &[String],
        scheduler_type: &str,
        db_type: &str,
    ) -> Result<Self, ManagerError> {
        let task_db: Arc<dyn Store<Task>> = new_store(db_type, "tasks")?.into();
        let event_db: Arc<dyn Store<TaskEvent>> = new_store(db_type, "task_events")?.into();

        let worker_nodes = workers
            .iter()
            .map(|address| Node::new(address, "worker"))
            .collect();
        let worker_task_map = workers
            .iter()
            .map(|address| (address.clone(), Vec::new()))
            .collect();

        let client = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let mut manager = Manager {
            pending: VecDeque::new(),
            task_db,
            event_db,
            workers: workers.to_vec(),
            worker_nodes,
            worker_task_map,
            task_worker_map: HashMap::new(),
            scheduler: new_scheduler(scheduler_type),
            client,
        };
        manager.rebuild_bindings()?;
        Ok(manager)
    }

    /// The binding tables are process state. After a restart they are
    /// reconstructed from the task store: every non-terminal task carries
    /// the worker it was bound to.
    fn rebuild_bindings(&mut self) -> Result<(), StoreError> {
        for task in self.task_db.list()? {
            if task.state.is_terminal() {
                continue;
            }
            let Some(worker) = task.bound_worker.clone() else {
                continue;
            };
            info!(task_id = %task.id, worker = %worker, "restored binding");
            self.worker_task_map
                .entry(worker.clone())
                .or_default()
                .push(task.id);
            self.task_worker_map.insert(task.id, worker);
        }
        Ok(())
    }

    /// Intake: record the event, then queue it for dispatch. An accepted
    /// event is always in the event store or on the queue.
    pub fn add_task(&mut self, event: TaskEvent) -> Result<(), StoreError> {
        self.event_db.put(&event.id.to_string(), event.clone())?;
        self.pending.push_back(event);
        Ok(())
    }

    pub fn get_tasks(&self) -> Vec<Task> {
        match self.task_db.list() {
            Ok(tasks) => tasks,
            Err(err) => {
                error!(error = %err, "listing tasks failed");
                Vec::new()
            }
        }
    }

    pub fn select_worker(&self, task: &Task) -> Result<Node, ManagerError> {
        let candidates = self
            .scheduler
            .select_candidate_nodes(task, &self.worker_nodes);
        if candidates.is_empty() {
            return Err(ManagerError::Infeasible(task.id));
        }
        let scores = self.scheduler.score(task, &candidates);
        self.scheduler
            .pick(&scores, &candidates)
            .ok_or(ManagerError::Infeasible(task.id))
    }

    /// Dispatch one pending event, if any.
    ///
    /// A bound task only accepts a Completed intent (forwarded to the
    /// owning worker as a DELETE); anything else against a bound task is
    /// dropped. An unbound task is placed through the scheduler, bound,
    /// marked Scheduled, persisted, and the event is POSTed to the worker.
    /// Transport failures put the event back on the queue.
    pub async fn send_work(&mut self) {
        let Some(mut event) = self.pending.pop_front() else {
            debug!("no work in the queue");
            return;
        };

        if let Err(err) = self.event_db.put(&event.id.to_string(), event.clone()) {
            error!(event_id = %event.id, error = %err, "recording event failed");
        }
        debug!(event_id = %event.id, task_id = %event.task.id, "pulled event off pending queue");

        let task_id = event.task.id;
        if let Some(worker) = self.task_worker_map.get(&task_id).cloned() {
            let persisted = match self.task_db.get(&task_id.to_string()) {
                Ok(task) => task,
                Err(err) => {
                    error!(task_id = %task_id, error = %err, "bound task missing from store, dropping event");
                    return;
                }
            };

            if event.state == State::Completed
                && valid_state_transition(&persisted.state, &event.state)
            {
                self.stop_task(&worker, &task_id.to_string()).await;
            } else {
                warn!(
                    task_id = %task_id,
                    current = %persisted.state,
                    desired = %event.state,
                    "existing bound task cannot take this transition, dropping event"
                );
            }
            return;
        }

        let node = match self.select_worker(&event.task) {
            Ok(node) => node,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "dropping event");
                return;
            }
        };

        self.worker_task_map
            .entry(node.name.clone())
            .or_default()
            .push(task_id);
        self.task_worker_map.insert(task_id, node.name.clone());

        event.task.state = State::Scheduled;
        event.task.bound_worker = Some(node.name.clone());
        if let Err(err) = self
            .task_db
            .put(&task_id.to_string(), event.task.clone())
        {
            error!(task_id = %task_id, error = %err, "persisting scheduled task failed");
            return;
        }
        info!(task_id = %task_id, worker = %node.name, "task bound");

        let url = format!("{}/tasks", node.api);
        match self.client.post(&url).json(&event).send().await {
            Err(err) => {
                error!(worker = %node.name, error = %err, "sending event failed, requeueing");
                self.pending.push_back(event);
            }
            Ok(response) if response.status() == StatusCode::CREATED => {
                match response.json::<Task>().await {
                    Ok(task) => debug!(task_id = %task.id, "worker accepted task"),
                    Err(err) => warn!(error = %err, "undecodable worker response"),
                }
            }
            Ok(response) => {
                let err = protocol_error(response).await;
                error!(worker = %node.name, error = %err, "worker rejected dispatch");
            }
        }
    }

    async fn stop_task(&self, worker: &str, task_id: &str) {
        let Some(api) = self.node_api(worker) else {
            warn!(worker, task_id, "no node for bound worker");
            return;
        };
        let url = format!("{api}/tasks/{task_id}");

        match self.client.delete(&url).send().await {
            Err(err) => error!(worker, task_id, error = %err, "stop request failed"),
            Ok(response) if response.status() == StatusCode::NO_CONTENT => {
                info!(task_id, worker, "task scheduled to stop");
            }
            Ok(response) => {
                let err = protocol_error(response).await;
                warn!(task_id, worker, error = %err, "unexpected stop response");
            }
        }
    }

    /// Fold one worker's task list into the manager's view. Tasks the
    /// manager does not know are ignored.
    pub fn apply_worker_tasks(&mut self, tasks: &[Task]) {
        for task in tasks {
            let key = task.id.to_string();
            let Ok(mut persisted) = self.task_db.get(&key) else {
                continue;
            };

            persisted.state = task.state;
            persisted.start_time = task.start_time;
            persisted.finish_time = task.finish_time;
            persisted.container_id = task.container_id.clone();
            persisted.host_ports = task.host_ports.clone();

            if let Err(err) = self.task_db.put(&key, persisted) {
                error!(task_id = %task.id, error = %err, "updating task failed");
            }
        }
    }

    /// Where to probe a Running task, if enough is known to build the URL:
    /// the bound worker's host plus the first runtime-assigned host port.
    fn health_probe_url(&self, task: &Task) -> Option<String> {
        if task.health_check.is_empty() {
            return None;
        }
        let host_port = task.first_host_port()?;
        let worker = self.task_worker_map.get(&task.id)?;
        let host = self
            .worker_nodes
            .iter()
            .find(|node| &node.name == worker)
            .map(|node| node.host.clone())?;
        Some(format!("http://{host}:{host_port}{}", task.health_check))
    }

    /// Stage a restart for the task: mark it Scheduled, burn one restart,
    /// clear the old run's timestamps, persist, and hand back the event to
    /// deliver. Returns `None` when the task is gone, out of budget, or
    /// unbound. The binding never moves.
    fn prepare_restart(&mut self, task_id: &Uuid) -> Option<PreparedRestart> {
        let key = task_id.to_string();
        let mut task = match self.task_db.get(&key) {
            Ok(task) => task,
            Err(err) => {
                error!(task_id = %task_id, error = %err, "restart target missing from store");
                return None;
            }
        };
        if task.restart_count >= RESTART_BUDGET {
            debug!(task_id = %task_id, "restart budget exhausted");
            return None;
        }
        let Some(worker) = self.task_worker_map.get(task_id).cloned() else {
            warn!(task_id = %task_id, "cannot restart an unbound task");
            return None;
        };
        let Some(api) = self.node_api(&worker) else {
            warn!(task_id = %task_id, worker = %worker, "no node for bound worker");
            return None;
        };

        task.state = State::Scheduled;
        task.restart_count += 1;
        task.start_time = None;
        task.finish_time = None;
        if let Err(err) = self.task_db.put(&key, task.clone()) {
            error!(task_id = %task_id, error = %err, "persisting restart failed");
            return None;
        }

        info!(task_id = %task_id, worker = %worker, attempt = task.restart_count, "restarting task");
        Some(PreparedRestart {
            event: TaskEvent::new(State::Running, task),
            worker,
            url: format!("{api}/tasks"),
        })
    }

    fn node_api(&self, worker: &str) -> Option<String> {
        self.worker_nodes
            .iter()
            .find(|node| node.name == worker)
            .map(|node| node.api.clone())
    }
}

/// A restart staged under the lock, ready to POST without it.
struct PreparedRestart {
    event: TaskEvent,
    worker: String,
    url: String,
}

/// Restart a task without pinning the manager lock across the worker-facing
/// POST: stage the restart under a short-lived lock, deliver it unlocked,
/// then re-acquire only to requeue a failed delivery.
async fn restart_task(manager: &SharedManager, task_id: &Uuid) {
    let (prepared, client) = {
        let mut guard = manager.lock().await;
        (guard.prepare_restart(task_id), guard.client.clone())
    };
    let Some(PreparedRestart { event, worker, url }) = prepared else {
        return;
    };

    match client.post(&url).json(&event).send().await {
        Err(err) => {
            error!(worker = %worker, error = %err, "restart dispatch failed, requeueing");
            manager.lock().await.pending.push_back(event);
        }
        Ok(response) if response.status() == StatusCode::CREATED => {}
        Ok(response) => {
            let err = protocol_error(response).await;
            error!(worker = %worker, error = %err, "worker rejected restart");
        }
    }
}

/// Fold an unexpected worker reply into [`ManagerError::Protocol`],
/// decoding the error body when there is one.
async fn protocol_error(response: reqwest::Response) -> ManagerError {
    let status = response.status().as_u16();
    let message = match response.json::<ErrResponse>().await {
        Ok(body) => body.message,
        Err(err) => format!("undecodable error body: {err}"),
    };
    ManagerError::Protocol { status, message }
}

/// Dispatch loop: every 10 s pull one event off the pending queue.
pub async fn process_tasks(manager: SharedManager, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        manager.lock().await.send_work().await;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(DISPATCH_INTERVAL) => {}
        }
    }
    info!("dispatch loop stopped");
}

/// Status reconciliation loop: every 15 s pull each worker's task list and
/// fold it into the manager's view.
pub async fn update_tasks(manager: SharedManager, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        reconcile_once(&manager).await;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(UPDATE_INTERVAL) => {}
        }
    }
    info!("reconciliation loop stopped");
}

async fn reconcile_once(manager: &SharedManager) {
    let (client, workers) = {
        let guard = manager.lock().await;
        (guard.client.clone(), guard.workers.clone())
    };

    for worker in workers {
        debug!(worker = %worker, "checking worker for task updates");
        let url = format!("http://{worker}/tasks");

        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                warn!(worker = %worker, error = %err, "worker unreachable");
                continue;
            }
        };
        if response.status() != StatusCode::OK {
            warn!(worker = %worker, status = %response.status(), "unexpected task list response");
            continue;
        }
        let tasks: Vec<Task> = match response.json().await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!(worker = %worker, error = %err, "undecodable task list");
                continue;
            }
        };

        manager.lock().await.apply_worker_tasks(&tasks);
    }
}

/// Health loop: every 60 s probe Running tasks and restart unhealthy or
/// Failed tasks that still have restart budget.
pub async fn do_health_checks(manager: SharedManager, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        health_check_once(&manager).await;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(HEALTH_INTERVAL) => {}
        }
    }
    info!("health loop stopped");
}

async fn health_check_once(manager: &SharedManager) {
    let (tasks, client) = {
        let guard = manager.lock().await;
        (guard.get_tasks(), guard.client.clone())
    };

    for task in tasks {
        match task.state {
            State::Running => {
                let url = { manager.lock().await.health_probe_url(&task) };
                let Some(url) = url else {
                    debug!(task_id = %task.id, "no probe target known, skipping");
                    continue;
                };
                if !probe(&client, &url).await && task.restart_count < RESTART_BUDGET {
                    restart_task(manager, &task.id).await;
                }
            }
            State::Failed if task.restart_count < RESTART_BUDGET => {
                restart_task(manager, &task.id).await;
            }
            _ => {}
        }
    }
}

/// Transport failures are retried by the helper; a non-200 answer is an
/// immediate health failure.
async fn probe(client: &reqwest::Client, url: &str) -> bool {
    match with_retry(|| client.get(url).send(), "health check").await {
        Ok(response) if response.status() == StatusCode::OK => {
            debug!(url, "health check passed");
            true
        }
        Ok(response) => {
            warn!(url, status = %response.status(), "health check failed");
            false
        }
        Err(err) => {
            warn!(url, error = %err, "health check unreachable");
            false
        }
    }
}

/// Stats loop: every 15 s refresh each node's capacity numbers from its
/// worker. A failed poll leaves the previous values in place.
pub async fn collect_stats(manager: SharedManager, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        collect_stats_once(&manager).await;
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(STATS_INTERVAL) => {}
        }
    }
    info!("stats loop stopped");
}

async fn collect_stats_once(manager: &SharedManager) {
    let (client, names) = {
        let guard = manager.lock().await;
        let names: Vec<String> = guard.worker_nodes.iter().map(|n| n.name.clone()).collect();
        (guard.client.clone(), names)
    };

    for name in names {
        let node = {
            let guard = manager.lock().await;
            guard
                .worker_nodes
                .iter()
                .find(|node| node.name == name)
                .cloned()
        };
        let Some(mut node) = node else {
            continue;
        };

        match node.refresh_stats(&client).await {
            Ok(()) => {
                let mut guard = manager.lock().await;
                if let Some(slot) = guard.worker_nodes.iter_mut().find(|n| n.name == name) {
                    *slot = node;
                }
            }
            Err(err) => {
                warn!(node = %name, error = %err, "stats collection failed, keeping stale values");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::Mutex;

    use super::*;

    // 127.0.0.1:1 refuses connections, which exercises the transport
    // failure paths without a live worker.
    const DEAD_WORKER: &str = "127.0.0.1:1";

    fn manager_with(scheduler: &str) -> Manager {
        Manager::new(&[DEAD_WORKER.to_string()], scheduler, "inmemory").unwrap()
    }

    fn event_for(task: Task, state: State) -> TaskEvent {
        TaskEvent::new(state, task)
    }

    fn assert_binding_unique(manager: &Manager) {
        for (task_id, worker) in &manager.task_worker_map {
            let holders: Vec<_> = manager
                .worker_task_map
                .iter()
                .filter(|(_, tasks)| tasks.contains(task_id))
                .map(|(name, _)| name.clone())
                .collect();
            assert_eq!(holders, vec![worker.clone()]);
        }
        for (worker, tasks) in &manager.worker_task_map {
            for task_id in tasks {
                assert_eq!(manager.task_worker_map.get(task_id), Some(worker));
            }
        }
    }

    #[tokio::test]
    async fn add_task_records_the_event_and_queues_it() {
        let mut manager = manager_with("roundrobin");
        let event = event_for(Task::default(), State::Scheduled);

        manager.add_task(event.clone()).unwrap();

        assert_eq!(manager.pending.len(), 1);
        assert_eq!(
            manager
                .event_db
                .get(&event.id.to_string())
                .unwrap()
                .task
                .id,
            event.task.id
        );
    }

    #[tokio::test]
    async fn dispatch_binds_and_requeues_on_transport_failure() {
        let mut manager = manager_with("roundrobin");
        let task = Task {
            memory: 100,
            ..Default::default()
        };
        let task_id = task.id;
        manager.add_task(event_for(task, State::Scheduled)).unwrap();

        manager.send_work().await;

        assert_eq!(
            manager.task_worker_map.get(&task_id).map(String::as_str),
            Some(DEAD_WORKER)
        );
        assert_binding_unique(&manager);

        let persisted = manager.task_db.get(&task_id.to_string()).unwrap();
        assert_eq!(persisted.state, State::Scheduled);
        assert_eq!(persisted.bound_worker.as_deref(), Some(DEAD_WORKER));

        // The POST could not be delivered, so the event is back on the
        // queue rather than lost.
        assert_eq!(manager.pending.len(), 1);
    }

    #[tokio::test]
    async fn redispatch_of_a_bound_task_does_not_rebind() {
        let mut manager = manager_with("roundrobin");
        let task = Task {
            memory: 100,
            ..Default::default()
        };
        let task_id = task.id;
        manager.add_task(event_for(task, State::Scheduled)).unwrap();

        manager.send_work().await;
        // Second pass dequeues the requeued event; the task is already
        // bound and not moving to Completed, so the event is dropped.
        manager.send_work().await;

        assert_eq!(manager.pending.len(), 0);
        assert_eq!(
            manager.worker_task_map.get(DEAD_WORKER).unwrap().len(),
            1
        );
        assert_binding_unique(&manager);
    }

    #[tokio::test]
    async fn infeasible_task_is_dropped_without_binding() {
        // EPVM against a node that has never reported capacity: nothing
        // fits.
        let mut manager = manager_with("epvm");
        let task = Task {
            memory: 2000,
            ..Default::default()
        };
        let task_id = task.id;
        manager.add_task(event_for(task, State::Scheduled)).unwrap();

        manager.send_work().await;

        assert!(manager.task_worker_map.is_empty());
        assert!(manager.pending.is_empty());
        assert!(matches!(
            manager.task_db.get(&task_id.to_string()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn completed_intent_for_a_bound_task_keeps_the_binding() {
        let mut manager = manager_with("roundrobin");
        let mut task = Task {
            memory: 100,
            ..Default::default()
        };
        task.state = State::Running;
        task.bound_worker = Some(DEAD_WORKER.to_string());
        let task_id = task.id;
        manager
            .task_db
            .put(&task_id.to_string(), task.clone())
            .unwrap();
        manager
            .worker_task_map
            .entry(DEAD_WORKER.to_string())
            .or_default()
            .push(task_id);
        manager.task_worker_map.insert(task_id, DEAD_WORKER.to_string());

        manager.add_task(event_for(task, State::Completed)).unwrap();
        manager.send_work().await;

        // The DELETE failed in transport, which is logged, not retried.
        // The binding and the persisted state are untouched.
        assert_eq!(
            manager.task_worker_map.get(&task_id).map(String::as_str),
            Some(DEAD_WORKER)
        );
        assert_eq!(
            manager.task_db.get(&task_id.to_string()).unwrap().state,
            State::Running
        );
        assert_binding_unique(&manager);
    }

    #[tokio::test]
    async fn restart_burns_budget_and_requeues_the_event() {
        let mut manager = manager_with("roundrobin");
        let mut task = Task::default();
        task.state = State::Failed;
        task.restart_count = 1;
        task.start_time = Some(chrono::Utc::now());
        task.finish_time = Some(chrono::Utc::now());
        let task_id = task.id;
        manager.task_db.put(&task_id.to_string(), task).unwrap();
        manager
            .worker_task_map
            .entry(DEAD_WORKER.to_string())
            .or_default()
            .push(task_id);
        manager.task_worker_map.insert(task_id, DEAD_WORKER.to_string());

        let manager = Arc::new(Mutex::new(manager));
        restart_task(&manager, &task_id).await;

        let guard = manager.lock().await;
        let restarted = guard.task_db.get(&task_id.to_string()).unwrap();
        assert_eq!(restarted.state, State::Scheduled);
        assert_eq!(restarted.restart_count, 2);
        assert!(restarted.start_time.is_none());
        assert!(restarted.finish_time.is_none());

        // The POST failed, so the Running-intent event waits on the queue.
        assert_eq!(guard.pending.len(), 1);
        let queued = guard.pending.front().unwrap();
        assert_eq!(queued.state, State::Running);
        assert_eq!(queued.task.id, task_id);
    }

    #[tokio::test]
    async fn restart_budget_is_a_hard_ceiling() {
        let mut manager = manager_with("roundrobin");
        let mut task = Task::default();
        task.state = State::Failed;
        task.restart_count = RESTART_BUDGET;
        let task_id = task.id;
        manager.task_db.put(&task_id.to_string(), task).unwrap();
        manager.task_worker_map.insert(task_id, DEAD_WORKER.to_string());

        let manager = Arc::new(Mutex::new(manager));
        restart_task(&manager, &task_id).await;

        let guard = manager.lock().await;
        let unchanged = guard.task_db.get(&task_id.to_string()).unwrap();
        assert_eq!(unchanged.state, State::Failed);
        assert_eq!(unchanged.restart_count, RESTART_BUDGET);
        assert!(guard.pending.is_empty());
    }

    #[tokio::test]
    async fn worker_reports_overwrite_runtime_fields_only() {
        let mut manager = manager_with("roundrobin");
        let mut task = Task {
            name: "web".to_string(),
            memory: 64,
            ..Default::default()
        };
        task.state = State::Scheduled;
        let task_id = task.id;
        manager.task_db.put(&task_id.to_string(), task).unwrap();

        let mut reported = Task {
            id: task_id,
            ..Default::default()
        };
        reported.state = State::Running;
        reported.container_id = Some("cafebabe".to_string());
        reported.start_time = Some(chrono::Utc::now());

        let unknown = Task::default();
        manager.apply_worker_tasks(&[reported.clone(), unknown.clone()]);

        let updated = manager.task_db.get(&task_id.to_string()).unwrap();
        assert_eq!(updated.state, State::Running);
        assert_eq!(updated.container_id.as_deref(), Some("cafebabe"));
        // Declarative fields stay as submitted.
        assert_eq!(updated.name, "web");
        assert_eq!(updated.memory, 64);

        assert!(matches!(
            manager.task_db.get(&unknown.id.to_string()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn bindings_rebuild_from_the_task_store() {
        let mut manager = manager_with("roundrobin");

        let mut live = Task::default();
        live.state = State::Running;
        live.bound_worker = Some(DEAD_WORKER.to_string());
        let mut done = Task::default();
        done.state = State::Completed;
        done.bound_worker = Some(DEAD_WORKER.to_string());

        manager.task_db.put(&live.id.to_string(), live.clone()).unwrap();
        manager.task_db.put(&done.id.to_string(), done.clone()).unwrap();

        manager.task_worker_map.clear();
        manager.worker_task_map.clear();
        manager.rebuild_bindings().unwrap();

        assert_eq!(
            manager.task_worker_map.get(&live.id).map(String::as_str),
            Some(DEAD_WORKER)
        );
        assert!(!manager.task_worker_map.contains_key(&done.id));
        assert_binding_unique(&manager);
    }

    #[tokio::test]
    async fn probe_url_needs_a_health_check_a_port_and_a_binding() {
        let mut manager = manager_with("roundrobin");
        let mut task = Task::default();
        task.state = State::Running;
        task.health_check = "/health".to_string();

        // No host port known yet.
        assert!(manager.health_probe_url(&task).is_none());

        let mut ports = bollard::secret::PortMap::new();
        ports.insert(
            "7777/tcp".to_string(),
            Some(vec![bollard::secret::PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("49160".to_string()),
            }]),
        );
        task.host_ports = Some(ports);

        // Still unbound.
        assert!(manager.health_probe_url(&task).is_none());

        manager.task_worker_map.insert(task.id, DEAD_WORKER.to_string());
        let url = manager.health_probe_url(&task).unwrap();
        assert_eq!(url, "http://127.0.0.1:49160/health");

        // A task without a health check path is never probed.
        task.health_check = String::new();
        assert!(manager.health_probe_url(&task).is_none());
    }

    #[tokio::test]
    async fn select_worker_is_infeasible_with_no_nodes() {
        let mut manager = manager_with("epvm");
        manager.worker_nodes.clear();
        let err = manager.select_worker(&Task::default()).unwrap_err();
        assert!(matches!(err, ManagerError::Infeasible(_)));
    }
}
