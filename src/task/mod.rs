pub mod docker;
pub mod state;
pub mod types;

pub use docker::{DockerClient, DockerError};
pub use state::valid_state_transition;
pub use types::{new_config, Config, State, Task, TaskEvent};
