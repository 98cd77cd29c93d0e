//! Host resource metrics: disk, memory, load and uptime.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sysinfo::{Disks, System};
use tracing::debug;

use crate::Probes;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiskUsage {
    pub ok: bool,
    pub total: u64,
    pub free: u64,
    pub used: u64,
    pub free_pct: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemUsage {
    pub ok: bool,
    pub total: u64,
    pub avail: u64,
    pub avail_pct: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadAverage {
    pub ok: bool,
    pub load1: f64,
    pub load5: f64,
    pub load15: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Uptime {
    pub ok: bool,
    pub uptime_s: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HostMetrics {
    pub platform: String,
    pub cpu_count: usize,
    pub disk: DiskUsage,
    pub mem: MemUsage,
    pub cpu: LoadAverage,
    pub uptime: Uptime,
    pub process_uptime_s: u64,
}

/// One mounted volume: mount point, total bytes, available bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub mount_point: PathBuf,
    pub total: u64,
    pub available: u64,
}

/// Usage of the volume whose mount point is the longest prefix of `path`.
pub fn volume_usage(volumes: &[Volume], path: &Path) -> DiskUsage {
    let Some(volume) = volumes
        .iter()
        .filter(|v| path.starts_with(&v.mount_point))
        .max_by_key(|v| v.mount_point.components().count())
    else {
        return DiskUsage {
            message: format!("no mounted volume holds {}", path.display()),
            ..DiskUsage::default()
        };
    };
    let (total, free) = (volume.total, volume.available.min(volume.total));
    DiskUsage {
        ok: true,
        total,
        free,
        used: total - free,
        free_pct: if total > 0 { free as f64 / total as f64 } else { 0.0 },
        message: String::new(),
    }
}

/// Filesystem usage for the volume holding `path`.
pub fn disk_usage(path: &Path) -> DiskUsage {
    let path = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    let volumes: Vec<Volume> = disks
        .list()
        .iter()
        .map(|d| Volume {
            mount_point: d.mount_point().to_path_buf(),
            total: d.total_space(),
            available: d.available_space(),
        })
        .collect();
    debug!(volumes = volumes.len(), "disks enumerated");
    volume_usage(&volumes, &path)
}

/// Memory from byte counts; available falls back to free when unreported.
pub fn mem_from(total: u64, available: u64, free: u64) -> MemUsage {
    if total == 0 {
        return MemUsage {
            message: "memory metrics are not supported on this platform".into(),
            ..MemUsage::default()
        };
    }
    let avail = if available > 0 { available } else { free };
    MemUsage {
        ok: true,
        total,
        avail,
        avail_pct: avail as f64 / total as f64,
        message: String::new(),
    }
}

pub fn mem_usage() -> MemUsage {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return mem_from(0, 0, 0);
    }
    let mut sys = System::new();
    sys.refresh_memory();
    mem_from(sys.total_memory(), sys.available_memory(), sys.free_memory())
}

/// 1/5/15-minute load averages.
pub fn load_average() -> LoadAverage {
    if !sysinfo::IS_SUPPORTED_SYSTEM || cfg!(windows) {
        return LoadAverage {
            message: "load average is not supported on this platform".into(),
            ..LoadAverage::default()
        };
    }
    let la = System::load_average();
    LoadAverage {
        ok: true,
        load1: la.one,
        load5: la.five,
        load15: la.fifteen,
        message: String::new(),
    }
}

pub fn host_uptime() -> Uptime {
    if !sysinfo::IS_SUPPORTED_SYSTEM {
        return Uptime {
            message: "uptime is not supported on this platform".into(),
            ..Uptime::default()
        };
    }
    Uptime {
        ok: true,
        uptime_s: System::uptime(),
        message: String::new(),
    }
}

/// Primary LAN address: the source address the OS would route public
/// traffic from. Connecting a UDP socket sends nothing.
pub fn lan_ip() -> Option<String> {
    let sock = std::net::UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    sock.connect(("8.8.8.8", 80)).ok()?;
    let ip = sock.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then(|| ip.to_string())
}

impl Probes {
    /// Sampled on the blocking pool; disk enumeration can stall on slow mounts.
    pub async fn host_metrics(&self) -> HostMetrics {
        let root = self.layout().root.clone();
        let sampled = tokio::task::spawn_blocking(move || {
            (disk_usage(&root), mem_usage(), load_average(), host_uptime())
        })
        .await;
        let (disk, mem, cpu, uptime) = sampled.unwrap_or_else(|e| {
            let message = format!("host sampling failed: {e}");
            (
                DiskUsage {
                    message: message.clone(),
                    ..DiskUsage::default()
                },
                MemUsage {
                    message: message.clone(),
                    ..MemUsage::default()
                },
                LoadAverage {
                    message: message.clone(),
                    ..LoadAverage::default()
                },
                Uptime {
                    message,
                    ..Uptime::default()
                },
            )
        });
        HostMetrics {
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            cpu_count: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(0),
            disk,
            mem,
            cpu,
            uptime,
            process_uptime_s: self.process_uptime_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vol(mount: &str, total: u64, available: u64) -> Volume {
        Volume {
            mount_point: PathBuf::from(mount),
            total,
            available,
        }
    }

    #[test]
    fn deepest_mount_wins() {
        let volumes = [vol("/", 1000, 100), vol("/srv", 400, 300), vol("/srv/other", 10, 10)];
        let d = volume_usage(&volumes, Path::new("/srv/app"));
        assert!(d.ok);
        assert_eq!((d.total, d.free, d.used), (400, 300, 100));
        assert!((d.free_pct - 0.75).abs() < 1e-9);

        let root = volume_usage(&volumes, Path::new("/home/me"));
        assert_eq!(root.total, 1000);
    }

    #[test]
    fn no_volume_is_a_failure_object() {
        let d = volume_usage(&[], Path::new("/srv/app"));
        assert!(!d.ok);
        assert!(d.message.contains("/srv/app"));
    }

    #[test]
    fn memory_prefers_available() {
        let m = mem_from(16_000, 8_000, 1_000);
        assert_eq!(m.avail, 8_000);
        assert!((m.avail_pct - 0.5).abs() < 1e-9);
        assert_eq!(mem_from(1_000, 0, 250).avail, 250);

        let none = mem_from(0, 0, 0);
        assert!(!none.ok);
        assert!(none.message.contains("not supported"));
    }

    #[tokio::test]
    async fn host_metrics_sample_this_machine() {
        let dir = tempfile::tempdir().unwrap();
        let probes = Probes::new(
            opsdeck_core::Layout::new(dir.path()),
            std::sync::Arc::new(crate::ScriptedRunner::new()),
        );
        let m = probes.host_metrics().await;
        assert!(m.cpu_count > 0);
        assert!(m.platform.contains(std::env::consts::OS));
        if cfg!(target_os = "linux") {
            assert!(m.mem.ok, "{:?}", m.mem);
            assert!(m.uptime.ok);
            assert!(m.mem.total >= m.mem.avail);
        }
    }
}
