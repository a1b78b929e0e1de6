use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::{watch, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::worker::{self, Api, Worker};

// The single-binary entrypoint reads ORCHESTRATOR_HOST/PORT; the combined
// entrypoint names the same settings ORCHESTRATOR_WORKER_HOST/PORT.
fn default_host() -> String {
    std::env::var("ORCHESTRATOR_HOST")
        .or_else(|_| std::env::var("ORCHESTRATOR_WORKER_HOST"))
        .unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("ORCHESTRATOR_PORT")
        .or_else(|_| std::env::var("ORCHESTRATOR_WORKER_PORT"))
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(5556)
}

fn default_name() -> String {
    format!("worker-{}", Uuid::new_v4())
}

#[derive(Args)]
pub struct WorkerArgs {
    /// Hostname or IP address to listen on
    #[arg(short = 'H', long, default_value_t = default_host())]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = default_port())]
    port: u16,

    /// Name of this worker
    #[arg(short, long, default_value_t = default_name())]
    name: String,

    /// Datastore for tasks ("inmemory" or "persistent")
    #[arg(short, long, default_value = "inmemory")]
    dbtype: String,
}

impl WorkerArgs {
    pub async fn run(self) -> Result<()> {
        info!(name = %self.name, "starting worker");

        let worker = Worker::new(&self.name, &self.dbtype).context("starting worker")?;
        let worker = Arc::new(Mutex::new(worker));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let loops = [
            tokio::spawn(worker::run_tasks(worker.clone(), shutdown_rx.clone())),
            tokio::spawn(worker::update_tasks(worker.clone(), shutdown_rx.clone())),
            tokio::spawn(worker::collect_stats(worker.clone(), shutdown_rx.clone())),
        ];

        let api = Api::new(&self.host, self.port, worker);
        let server = tokio::spawn(api.serve(shutdown_rx));

        tokio::signal::ctrl_c()
            .await
            .context("listening for shutdown signal")?;
        info!("shutting down");
        let _ = shutdown_tx.send(true);

        for handle in loops {
            let _ = handle.await;
        }
        server.await?.context("worker api")?;
        Ok(())
    }
}
