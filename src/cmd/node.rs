use anyhow::Result;
use clap::Args;

use crate::client::ManagerClient;

const GIB: u64 = 1024 * 1024 * 1024;

#[derive(Args)]
pub struct NodeArgs {
    /// Manager to talk to, as host:port
    #[arg(short, long, default_value = "localhost:5555")]
    manager: String,
}

impl NodeArgs {
    pub async fn run(self) -> Result<()> {
        let client = ManagerClient::new(&self.manager);
        let nodes = client.get_nodes().await?;

        println!(
            "{:<24} {:<14} {:<12} {:<8} TASKS",
            "NAME", "MEMORY (MiB)", "DISK (GiB)", "ROLE"
        );
        for node in nodes {
            println!(
                "{:<24} {:<14} {:<12} {:<8} {}",
                node.name,
                node.memory,
                node.disk / GIB,
                node.role,
                node.task_count
            );
        }
        Ok(())
    }
}
