//! Resource sampling and display formats for supervised services

use std::collections::HashMap;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Usage of one process at the last sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    /// Percent of one core, as reported by sysinfo
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

/// Samples cpu and memory of a set of pids.
///
/// CPU usage is computed between two refreshes, so the first sample of a
/// process reports 0%.
pub struct ResourceSampler {
    system: System,
}

impl ResourceSampler {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    /// Refresh only `pids` and return the usage of those still present
    pub fn sample(&mut self, pids: &[u32]) -> HashMap<u32, ResourceUsage> {
        if pids.is_empty() {
            return HashMap::new();
        }
        let wanted: Vec<Pid> = pids.iter().map(|&p| Pid::from_u32(p)).collect();
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&wanted), true);

        pids.iter()
            .filter_map(|&pid| {
                let process = self.system.process(Pid::from_u32(pid))?;
                Some((
                    pid,
                    ResourceUsage {
                        cpu_percent: process.cpu_usage(),
                        memory_bytes: process.memory(),
                    },
                ))
            })
            .collect()
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// `2.1%`
pub fn format_cpu(percent: f32) -> String {
    format!("{:.1}%", percent)
}

/// `45.2MB`
pub fn format_memory(bytes: u64) -> String {
    format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
}

/// `2h 15m`, `15m` or `0m`
pub fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.as_secs() / 60;
    let hours = minutes / 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes % 60)
    } else {
        format!("{}m", minutes)
    }
}
