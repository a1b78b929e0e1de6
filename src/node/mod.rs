//! The manager's view of a worker host: static identity plus the capacity
//! numbers the scheduler filters and scores on.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::with_retry;
use crate::worker::Stats;

/// Workers listen here unless the configured address says otherwise.
pub const DEFAULT_WORKER_PORT: u16 = 5556;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("unable to connect to node {name}: {source}")]
    Transport {
        name: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("node {name} answered stats with status {status}")]
    BadStatus { name: String, status: u16 },
    #[error("stats from node {name} could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Capacity units follow the task model: memory in MiB, disk in bytes.
/// `memory` and `memory_allocated` are refreshed from worker stats; the
/// scheduler reads whatever the last successful poll left behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Node {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub api: String,
    pub cores: u64,
    pub memory: u64,
    pub memory_allocated: u64,
    pub disk: u64,
    pub disk_allocated: u64,
    pub role: String,
    pub task_count: u64,
    pub stats: Option<Stats>,
}

impl Node {
    /// Build a node from a configured `host:port` address. A bare hostname
    /// gets the default worker port, so health checks can always be
    /// addressed as `host:hostPort`.
    pub fn new(address: &str, role: &str) -> Self {
        let (host, port) = split_address(address);
        let api = format!("http://{host}:{port}");
        Node {
            name: address.to_string(),
            host,
            port,
            api,
            cores: 0,
            memory: 0,
            memory_allocated: 0,
            disk: 0,
            disk_allocated: 0,
            role: role.to_string(),
            task_count: 0,
            stats: None,
        }
    }

    /// MiB still unclaimed on this node, by the last observed sample.
    pub fn available_memory(&self) -> u64 {
        self.memory.saturating_sub(self.memory_allocated)
    }

    /// Pull `/stats` from the worker with bounded retries and fold the
    /// sample into the cached capacity numbers.
    pub async fn refresh_stats(&mut self, client: &reqwest::Client) -> Result<(), NodeError> {
        let url = format!("{}/stats", self.api);

        let response = with_retry(|| client.get(&url).send(), "node stats")
            .await
            .map_err(|source| NodeError::Transport {
                name: self.name.clone(),
                source,
            })?;

        if response.status().as_u16() != 200 {
            warn!(node = %self.name, status = %response.status(), "stats request rejected");
            return Err(NodeError::BadStatus {
                name: self.name.clone(),
                status: response.status().as_u16(),
            });
        }

        let stats: Stats = response.json().await.map_err(|source| NodeError::Decode {
            name: self.name.clone(),
            source,
        })?;

        self.memory = stats.mem_total_mib;
        self.memory_allocated = stats.mem_used_mib;
        self.disk = stats.disk_total;
        self.cores = stats.cpu_count;
        self.task_count = stats.task_count;
        self.stats = Some(stats);

        debug!(node = %self.name, memory_mib = self.memory, tasks = self.task_count, "stats refreshed");
        Ok(())
    }
}

fn split_address(address: &str) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), DEFAULT_WORKER_PORT),
        },
        None => (address.to_string(), DEFAULT_WORKER_PORT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        let node = Node::new("worker-1:6000", "worker");
        assert_eq!(node.host, "worker-1");
        assert_eq!(node.port, 6000);
        assert_eq!(node.api, "http://worker-1:6000");
    }

    #[test]
    fn bare_hostname_gets_default_port() {
        let node = Node::new("worker-1", "worker");
        assert_eq!(node.host, "worker-1");
        assert_eq!(node.port, DEFAULT_WORKER_PORT);
    }

    #[test]
    fn available_memory_never_underflows() {
        let mut node = Node::new("w:5556", "worker");
        node.memory = 100;
        node.memory_allocated = 250;
        assert_eq!(node.available_memory(), 0);
    }
}
