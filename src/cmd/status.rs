use anyhow::Result;
use chrono::Utc;
use clap::Args;

use crate::client::Client;

#[derive(Args)]
pub struct StatusArgs {
    /// Manager to talk to, as host:port
    #[arg(short, long, default_value = "localhost:5555")]
    manager: String,
}

impl StatusArgs {
    pub async fn run(self) -> Result<()> {
        let client = Client::new(&self.manager, "manager");
        let tasks = client.get_tasks().await?;

        println!(
            "{:<38} {:<20} {:<14} {:<11} {:<8} IMAGE",
            "ID", "NAME", "STARTED", "STATE", "RESTARTS"
        );
        for task in tasks {
            let started = match task.start_time {
                Some(start) => humanize_since(start),
                None => "-".to_string(),
            };
            println!(
                "{:<38} {:<20} {:<14} {:<11} {:<8} {}",
                task.id,
                task.name,
                started,
                task.state.to_string(),
                task.restart_count,
                task.image
            );
        }
        Ok(())
    }
}

fn humanize_since(start: chrono::DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(start);
    let seconds = elapsed.num_seconds().max(0);
    if seconds < 60 {
        format!("{seconds}s ago")
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn humanizes_elapsed_time() {
        let now = Utc::now();
        assert!(humanize_since(now - Duration::seconds(30)).ends_with("s ago"));
        assert_eq!(humanize_since(now - Duration::minutes(5)), "5m ago");
        assert_eq!(humanize_since(now - Duration::hours(3)), "3h ago");
        assert_eq!(humanize_since(now - Duration::days(2)), "2d ago");
    }
}
