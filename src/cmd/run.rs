use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::client::Client;
use crate::task::TaskEvent;

#[derive(Args)]
pub struct RunArgs {
    /// Manager to talk to, as host:port
    #[arg(short, long, default_value = "localhost:5555")]
    manager: String,

    /// Task specification file
    #[arg(short, long, default_value = "task.json")]
    filename: PathBuf,
}

impl RunArgs {
    pub async fn run(self) -> Result<()> {
        let data = std::fs::read_to_string(&self.filename)
            .with_context(|| format!("reading {}", self.filename.display()))?;
        let event: TaskEvent = serde_json::from_str(&data)
            .with_context(|| format!("parsing task event from {}", self.filename.display()))?;

        let client = Client::new(&self.manager, "manager");
        let task = client.send_task(&event).await?;

        info!(task_id = %task.id, "task request sent to manager");
        println!("{}", task.id);
        Ok(())
    }
}
