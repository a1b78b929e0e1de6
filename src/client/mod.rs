//! HTTP client used by the CLI to talk to a manager (or directly to a
//! worker, which serves the same task surface).

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

use crate::node::Node;
use crate::task::{Task, TaskEvent};
use crate::worker::ErrResponse;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unable to connect to {role} at {address}: {source}")]
    Transport {
        role: String,
        address: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{role} rejected the request ({status}): {message}")]
    Rejected {
        role: String,
        status: u16,
        message: String,
    },
    #[error("undecodable response from {role}: {source}")]
    Decode {
        role: String,
        #[source]
        source: reqwest::Error,
    },
}

pub struct Client {
    address: String,
    role: String,
    http: reqwest::Client,
}

impl Client {
    pub fn new(address: &str, role: &str) -> Self {
        Client {
            address: to_http_url(address),
            role: role.to_string(),
            http: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn get_tasks(&self) -> Result<Vec<Task>, ClientError> {
        let url = format!("{}/tasks", self.address);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| self.transport(source))?;

        if response.status() != StatusCode::OK {
            return Err(self.rejected(response).await);
        }
        response
            .json()
            .await
            .map_err(|source| self.decode(source))
    }

    pub async fn send_task(&self, event: &TaskEvent) -> Result<Task, ClientError> {
        let url = format!("{}/tasks", self.address);
        let response = self
            .http
            .post(&url)
            .json(event)
            .send()
            .await
            .map_err(|source| self.transport(source))?;

        if response.status() != StatusCode::CREATED {
            return Err(self.rejected(response).await);
        }
        let task: Task = response
            .json()
            .await
            .map_err(|source| self.decode(source))?;
        debug!(task_id = %task.id, "task submitted");
        Ok(task)
    }

    pub async fn stop_task(&self, task_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/tasks/{}", self.address, task_id);
        let response = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|source| self.transport(source))?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(self.rejected(response).await);
        }
        Ok(())
    }

    fn transport(&self, source: reqwest::Error) -> ClientError {
        ClientError::Transport {
            role: self.role.clone(),
            address: self.address.clone(),
            source,
        }
    }

    fn decode(&self, source: reqwest::Error) -> ClientError {
        ClientError::Decode {
            role: self.role.clone(),
            source,
        }
    }

    async fn rejected(&self, response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = match response.json::<ErrResponse>().await {
            Ok(err) => err.message,
            Err(_) => "no further detail".to_string(),
        };
        ClientError::Rejected {
            role: self.role.clone(),
            status,
            message,
        }
    }
}

/// Client for the manager-only surface.
pub struct ManagerClient {
    inner: Client,
}

impl ManagerClient {
    pub fn new(address: &str) -> Self {
        ManagerClient {
            inner: Client::new(address, "manager"),
        }
    }

    pub async fn get_nodes(&self) -> Result<Vec<Node>, ClientError> {
        let url = format!("{}/nodes", self.inner.address);
        let response = self
            .inner
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| self.inner.transport(source))?;

        if response.status() != StatusCode::OK {
            return Err(self.inner.rejected(response).await);
        }
        response
            .json()
            .await
            .map_err(|source| self.inner.decode(source))
    }
}

fn to_http_url(address: &str) -> String {
    if address.starts_with("http://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_addresses_get_a_scheme() {
        assert_eq!(to_http_url("localhost:5555"), "http://localhost:5555");
        assert_eq!(to_http_url("http://x:1"), "http://x:1");
    }
}
