//! Host-level signals: CPU, memory, and disk of the collector host.
//!
//! These reflect the machine the sampler runs on, not necessarily the
//! shard's host — adequate for single-host deployments where the shard
//! containers share the collector's kernel.

use std::path::Path;
use std::time::Duration;

use sysinfo::{Disks, System};
use tokio::sync::Mutex;

/// CPU is averaged over this window, matching the sampling contract.
const CPU_WINDOW: Duration = Duration::from_secs(1);

/// One reading of the collector host.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HostSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Reusable probe holding the `sysinfo` state between refreshes.
pub struct HostProbe {
    system: Mutex<System>,
}

impl HostProbe {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Sample CPU over a one-second window, virtual-memory used-percent,
    /// and root-filesystem used-percent.
    pub async fn sample(&self) -> HostSample {
        let mut system = self.system.lock().await;

        system.refresh_cpu();
        tokio::time::sleep(CPU_WINDOW).await;
        system.refresh_cpu();
        let cpu_percent = system.global_cpu_info().cpu_usage() as f64;

        system.refresh_memory();
        let memory_percent = if system.total_memory() > 0 {
            system.used_memory() as f64 / system.total_memory() as f64 * 100.0
        } else {
            0.0
        };

        HostSample {
            cpu_percent,
            memory_percent,
            disk_percent: root_disk_percent(),
        }
    }
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Used-percent of the filesystem mounted at `/`, or of the first listed
/// disk when no root mount is visible (containerized environments).
fn root_disk_percent() -> f64 {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .find(|d| d.mount_point() == Path::new("/"))
        .or_else(|| disks.iter().next());

    match disk {
        Some(disk) if disk.total_space() > 0 => {
            let used = disk.total_space() - disk.available_space();
            used as f64 / disk.total_space() as f64 * 100.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sample_produces_percentages_in_range() {
        let probe = HostProbe::new();
        let sample = probe.sample().await;

        assert!((0.0..=100.0).contains(&sample.memory_percent));
        assert!((0.0..=100.0).contains(&sample.disk_percent));
        // Multi-core bursts can nudge past 100 briefly; just sanity-bound.
        assert!(sample.cpu_percent >= 0.0);
    }
}
