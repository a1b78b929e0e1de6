//! The worker agent: a task-intake queue, a transition-enforced execution
//! loop against the container runtime, a reconciliation loop that infers
//! state from runtime inspection, and a stats sampler.

pub mod api;
pub mod stats;
pub mod types;
#[allow(clippy::module_inception)]
pub mod worker;

pub use api::Api;
pub use stats::{get_stats, Stats};
pub use types::{ErrResponse, SharedWorker, Worker, WorkerError};
pub use worker::{collect_stats, run_next, run_tasks, update_tasks};
