use anyhow::Result;
use clap::Args;

use crate::client::Client;

#[derive(Args)]
pub struct StopArgs {
    /// Manager to talk to, as host:port
    #[arg(short, long, default_value = "localhost:5555")]
    manager: String,

    /// Task id to stop
    id: String,
}

impl StopArgs {
    pub async fn run(self) -> Result<()> {
        let client = Client::new(&self.manager, "manager");
        client.stop_task(&self.id).await?;
        println!("task {} has been scheduled to stop", self.id);
        Ok(())
    }
}
