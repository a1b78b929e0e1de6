use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

/// One sample of the worker host. Memory is reported in MiB so the
/// manager can compare it against task requests without conversion; disk
/// stays in bytes, matching what the runtime reports for images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Stats {
    pub hostname: String,
    pub cpu_count: u64,
    pub cpu_usage_percent: f64,
    pub mem_total_mib: u64,
    pub mem_used_mib: u64,
    pub mem_available_mib: u64,
    pub disk_total: u64,
    pub disk_free: u64,
    pub task_count: u64,
}

const MIB: u64 = 1024 * 1024;

/// Sample the host. Callers refresh `sys` first; cpu usage is meaningful
/// from the second refresh onward.
pub fn get_stats(sys: &System, task_count: u64) -> Stats {
    let disks = Disks::new_with_refreshed_list();
    let disk_total = disks.iter().map(|disk| disk.total_space()).sum();
    let disk_free = disks.iter().map(|disk| disk.available_space()).sum();

    Stats {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        cpu_count: sys.cpus().len() as u64,
        cpu_usage_percent: f64::from(sys.global_cpu_usage()),
        mem_total_mib: sys.total_memory() / MIB,
        mem_used_mib: sys.used_memory() / MIB,
        mem_available_mib: sys.available_memory() / MIB,
        disk_total,
        disk_free,
        task_count,
    }
}
