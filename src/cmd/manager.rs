use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::sync::{watch, Mutex};
use tracing::info;

use crate::manager::{self, Api, Manager};

fn default_host() -> String {
    std::env::var("ORCHESTRATOR_MANAGER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("ORCHESTRATOR_MANAGER_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(5555)
}

#[derive(Args)]
pub struct ManagerArgs {
    /// Hostname or IP address to listen on
    #[arg(short = 'H', long, default_value_t = default_host())]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = default_port())]
    port: u16,

    /// Workers the manager schedules tasks onto, as host:port
    #[arg(short, long, value_delimiter = ',', default_value = "localhost:5556")]
    workers: Vec<String>,

    /// Scheduler to use ("epvm" or "roundrobin")
    #[arg(short, long, default_value = "epvm")]
    scheduler: String,

    /// Datastore for tasks and events ("inmemory" or "persistent")
    #[arg(short, long, default_value = "inmemory")]
    dbtype: String,
}

impl ManagerArgs {
    pub async fn run(self) -> Result<()> {
        info!(workers = ?self.workers, scheduler = %self.scheduler, "starting manager");

        let manager = Manager::new(&self.workers, &self.scheduler, &self.dbtype)
            .context("starting manager")?;
        let manager = Arc::new(Mutex::new(manager));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let loops = [
            tokio::spawn(manager::process_tasks(manager.clone(), shutdown_rx.clone())),
            tokio::spawn(manager::update_tasks(manager.clone(), shutdown_rx.clone())),
            tokio::spawn(manager::do_health_checks(
                manager.clone(),
                shutdown_rx.clone(),
            )),
            tokio::spawn(manager::collect_stats(manager.clone(), shutdown_rx.clone())),
        ];

        let api = Api::new(&self.host, self.port, manager);
        let server = tokio::spawn(api.serve(shutdown_rx));

        tokio::signal::ctrl_c()
            .await
            .context("listening for shutdown signal")?;
        info!("shutting down");
        let _ = shutdown_tx.send(true);

        for handle in loops {
            let _ = handle.await;
        }
        server.await?.context("manager api")?;
        Ok(())
    }
}
