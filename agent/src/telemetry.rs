//! Host information for the status endpoint

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Host the daemon runs on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostname: String,

    /// OS name and version
    pub os: String,

    /// System uptime in seconds
    pub uptime_secs: u64,

    pub cpu_count: usize,

    /// Memory usage in bytes
    pub memory_used: u64,

    /// Total memory in bytes
    pub memory_total: u64,
}

/// Collect host information
pub fn collect_host_info() -> HostInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    HostInfo {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        os: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
        uptime_secs: System::uptime(),
        cpu_count: sys.cpus().len(),
        memory_used: sys.used_memory(),
        memory_total: sys.total_memory(),
    }
}
