use std::collections::HashMap;
use std::time::Duration;

use bollard::container::{
    CreateContainerOptions, InspectContainerOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::secret::{
    ContainerInspectResponse, HostConfig, PortBinding, PortMap, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::Config;

/// Seconds the runtime waits for a container to exit before killing it.
const STOP_GRACE_SECS: i64 = 10;
/// Image pulls are retried a few times; registry hiccups are common.
const PULL_ATTEMPTS: u32 = 3;
const PULL_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum DockerError {
    #[error("unable to reach the container runtime: {0}")]
    Connect(#[source] bollard::errors::Error),
    #[error("pulling image {image} failed: {source}")]
    ImagePull {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("creating container {name} failed: {source}")]
    ContainerCreate {
        name: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("starting container {id} failed: {source}")]
    ContainerStart {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("stopping container {id} failed: {source}")]
    ContainerStop {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("removing container {id} failed: {source}")]
    ContainerRemove {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("inspecting container {id} failed: {source}")]
    ContainerInspect {
        id: String,
        #[source]
        source: bollard::errors::Error,
    },
}

/// Thin driver over the local container runtime. All operations are
/// synchronous from the caller's point of view and return errors instead of
/// panicking the loop that invoked them.
#[derive(Debug, Clone)]
pub struct DockerClient {
    client: Docker,
}

impl DockerClient {
    pub fn connect() -> Result<Self, DockerError> {
        let client = Docker::connect_with_unix_defaults().map_err(DockerError::Connect)?;
        Ok(DockerClient { client })
    }

    /// Pull the image, create the container with the task's resource limits
    /// and port layout, start it, and attach its log stream. Returns the
    /// container id.
    pub async fn run(&self, config: &Config) -> Result<String, DockerError> {
        self.pull_image(&config.image).await?;

        let restart_policy = RestartPolicy {
            name: Some(parse_restart_policy(&config.restart_policy)),
            maximum_retry_count: None,
        };

        let host_config = HostConfig {
            restart_policy: Some(restart_policy),
            memory: memory_limit_bytes(config.memory),
            port_bindings: port_bindings(&config.port_bindings),
            publish_all_ports: Some(true),
            ..Default::default()
        };

        let container_config = bollard::container::Config {
            image: Some(config.image.clone()),
            env: some_if_nonempty(&config.env),
            cmd: some_if_nonempty(&config.cmd),
            exposed_ports: exposed_ports(&config.exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = Some(CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        });

        let created = self
            .client
            .create_container(options, container_config)
            .await
            .map_err(|source| DockerError::ContainerCreate {
                name: config.name.clone(),
                source,
            })?;

        self.client
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|source| DockerError::ContainerStart {
                id: created.id.clone(),
                source,
            })?;

        info!(container_id = %created.id, image = %config.image, "container started");
        self.attach_logs(&created.id);

        Ok(created.id)
    }

    /// Stop the container with a bounded grace period, then remove it.
    pub async fn stop(&self, container_id: &str) -> Result<(), DockerError> {
        self.client
            .stop_container(container_id, Some(StopContainerOptions { t: STOP_GRACE_SECS }))
            .await
            .map_err(|source| DockerError::ContainerStop {
                id: container_id.to_string(),
                source,
            })?;

        self.client
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|source| DockerError::ContainerRemove {
                id: container_id.to_string(),
                source,
            })?;

        info!(container_id, "container stopped and removed");
        Ok(())
    }

    /// Live container state, or `None` when the runtime no longer knows the
    /// container.
    pub async fn inspect(
        &self,
        container_id: &str,
    ) -> Result<Option<ContainerInspectResponse>, DockerError> {
        match self
            .client
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Ok(container) => Ok(Some(container)),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(source) => Err(DockerError::ContainerInspect {
                id: container_id.to_string(),
                source,
            }),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let mut attempt = 1;
        loop {
            match self.try_pull_image(image).await {
                Ok(()) => return Ok(()),
                Err(source) if attempt < PULL_ATTEMPTS => {
                    warn!(image, attempt, error = %source, "image pull failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(PULL_RETRY_DELAY).await;
                }
                Err(source) => {
                    return Err(DockerError::ImagePull {
                        image: image.to_string(),
                        source,
                    })
                }
            }
        }
    }

    async fn try_pull_image(&self, image: &str) -> Result<(), bollard::errors::Error> {
        let mut stream = self.client.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(status) = info.status {
                debug!(image, %status, "pulling");
            }
        }
        Ok(())
    }

    /// Forward the container's output to the log at debug level. The stream
    /// runs until the container exits or the runtime drops it.
    fn attach_logs(&self, container_id: &str) {
        let client = self.client.clone();
        let id = container_id.to_string();
        tokio::spawn(async move {
            let mut stream = client.logs(
                &id,
                Some(LogsOptions::<String> {
                    follow: true,
                    stdout: true,
                    stderr: true,
                    ..Default::default()
                }),
            );
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(output) => debug!(container_id = %id, "{}", output),
                    Err(_) => break,
                }
            }
        });
    }
}

fn parse_restart_policy(policy: &str) -> RestartPolicyNameEnum {
    match policy {
        "always" => RestartPolicyNameEnum::ALWAYS,
        "unless-stopped" => RestartPolicyNameEnum::UNLESS_STOPPED,
        "on-failure" => RestartPolicyNameEnum::ON_FAILURE,
        _ => RestartPolicyNameEnum::NO,
    }
}

fn memory_limit_bytes(mib: u64) -> Option<i64> {
    if mib == 0 {
        None
    } else {
        Some((mib * 1024 * 1024) as i64)
    }
}

fn some_if_nonempty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

fn exposed_ports(ports: &[String]) -> Option<HashMap<String, HashMap<(), ()>>> {
    if ports.is_empty() {
        return None;
    }
    Some(
        ports
            .iter()
            .map(|port| (port.clone(), HashMap::new()))
            .collect(),
    )
}

fn port_bindings(bindings: &HashMap<String, String>) -> Option<PortMap> {
    if bindings.is_empty() {
        return None;
    }
    let map = bindings
        .iter()
        .map(|(container_port, host_port)| {
            (
                container_port.clone(),
                Some(vec![PortBinding {
                    host_ip: None,
                    host_port: Some(host_port.clone()),
                }]),
            )
        })
        .collect();
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_policy_parses_known_names() {
        assert_eq!(parse_restart_policy("always"), RestartPolicyNameEnum::ALWAYS);
        assert_eq!(
            parse_restart_policy("on-failure"),
            RestartPolicyNameEnum::ON_FAILURE
        );
        assert_eq!(parse_restart_policy(""), RestartPolicyNameEnum::NO);
        assert_eq!(parse_restart_policy("bogus"), RestartPolicyNameEnum::NO);
    }

    #[test]
    fn memory_limit_converts_mib_to_bytes() {
        assert_eq!(memory_limit_bytes(0), None);
        assert_eq!(memory_limit_bytes(128), Some(128 * 1024 * 1024));
    }

    #[test]
    fn port_bindings_keep_the_runtime_shape() {
        let mut wanted = HashMap::new();
        wanted.insert("80/tcp".to_string(), "8080".to_string());
        let map = port_bindings(&wanted).unwrap();
        let binding = map.get("80/tcp").unwrap().as_ref().unwrap();
        assert_eq!(binding[0].host_port.as_deref(), Some("8080"));

        assert!(port_bindings(&HashMap::new()).is_none());
    }
}
