//! CLI surface: subcommands for running cluster processes and for talking
//! to a running manager.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod manager;
mod node;
mod run;
mod status;
mod stop;
mod worker;

pub use manager::ManagerArgs;
pub use node::NodeArgs;
pub use run::RunArgs;
pub use status::StatusArgs;
pub use stop::StopArgs;
pub use worker::WorkerArgs;

#[derive(Parser)]
#[command(name = "corral", version, about = "A small cluster orchestrator")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the manager: accept tasks, place them on workers, reconcile
    /// state, restart unhealthy tasks
    Manager(ManagerArgs),
    /// Run a worker agent that executes tasks on the local container
    /// runtime
    Worker(WorkerArgs),
    /// List the worker nodes known to a manager
    Node(NodeArgs),
    /// Submit a task from a JSON file
    Run(RunArgs),
    /// List tasks and their states
    Status(StatusArgs),
    /// Stop a running task
    Stop(StopArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Manager(args) => args.run().await,
            Command::Worker(args) => args.run().await,
            Command::Node(args) => args.run().await,
            Command::Run(args) => args.run().await,
            Command::Status(args) => args.run().await,
            Command::Stop(args) => args.run().await,
        }
    }
}
