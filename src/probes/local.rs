//! Probes for the machine the agent runs on.
//!
//! Memory, CPU and disk come from `sysinfo`; inode and descriptor usage come
//! straight from libc. Services, logs and processes go through `LocalRunner`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{CpuRefreshKind, Disks, RefreshKind, System};
use tracing::debug;

use super::parse::ratio_percent;
use super::HostProbes;
use crate::error::ProbeError;
use crate::exec::{CommandRunner, LocalRunner};

/// Default CPU sampling window.
pub const DEFAULT_CPU_SAMPLE: Duration = Duration::from_secs(1);

/// Probe set for the local host.
#[derive(Debug, Clone)]
pub struct LocalHost {
    runner: LocalRunner,
    cpu_sample: Duration,
}

impl LocalHost {
    pub fn new(runner: LocalRunner, cpu_sample: Duration) -> Self {
        Self { runner, cpu_sample }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new(LocalRunner::default(), DEFAULT_CPU_SAMPLE)
    }
}

#[async_trait]
impl HostProbes for LocalHost {
    fn runner(&self) -> &dyn CommandRunner {
        &self.runner
    }

    async fn memory_usage(&self) -> Result<f64, ProbeError> {
        ensure_supported("memory")?;
        let mut sys = System::new();
        sys.refresh_memory();

        let total = sys.total_memory();
        if total == 0 {
            return Err(ProbeError::parse("memory", "total memory reported as zero"));
        }
        let used = total.saturating_sub(sys.available_memory());
        Ok(ratio_percent(used as f64, total as f64))
    }

    async fn cpu_usage(&self) -> Result<f64, ProbeError> {
        ensure_supported("cpu")?;
        let mut sys =
            System::new_with_specifics(RefreshKind::new().with_cpu(CpuRefreshKind::everything()));

        // Usage is a delta between two refreshes.
        let window = self.cpu_sample.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        tokio::time::sleep(window).await;
        sys.refresh_cpu();

        let usage = sys.global_cpu_info().cpu_usage() as f64;
        debug!(usage, window_ms = window.as_millis() as u64, "Sampled local CPU usage");
        Ok(usage)
    }

    async fn disk_usage(&self) -> Result<f64, ProbeError> {
        ensure_supported("disk")?;
        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == Path::new("/"))
            .ok_or_else(|| ProbeError::parse("disk", "no filesystem mounted at /"))?;

        let total = root.total_space();
        let used = total.saturating_sub(root.available_space());
        Ok(ratio_percent(used as f64, total as f64))
    }

    async fn inode_usage(&self) -> Result<f64, ProbeError> {
        os::inode_usage("/")
    }

    async fn fd_usage(&self) -> Result<f64, ProbeError> {
        os::fd_usage()
    }
}

fn ensure_supported(metric: &'static str) -> Result<(), ProbeError> {
    if sysinfo::IS_SUPPORTED_SYSTEM {
        Ok(())
    } else {
        Err(ProbeError::Os {
            metric,
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "sysinfo unsupported"),
        })
    }
}

#[cfg(unix)]
mod os {
    use std::ffi::CString;
    use std::io;

    use crate::error::ProbeError;
    use crate::probes::parse::ratio_percent;

    /// Used inodes over total inodes for the filesystem holding `path`.
    pub fn inode_usage(path: &str) -> Result<f64, ProbeError> {
        let c_path = CString::new(path).map_err(|e| ProbeError::parse("inode", e.to_string()))?;

        // SAFETY: `stats` is a plain C struct and `c_path` is NUL-terminated.
        let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) };
        if rc != 0 {
            return Err(ProbeError::Os {
                metric: "inode",
                source: io::Error::last_os_error(),
            });
        }

        let total = stats.f_files;
        let used = total.saturating_sub(stats.f_favail);
        Ok(ratio_percent(used as f64, total as f64))
    }

    /// Open descriptors of this process over its soft `RLIMIT_NOFILE`.
    pub fn fd_usage() -> Result<f64, ProbeError> {
        let mut limit = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        // SAFETY: `limit` is a valid out-pointer for getrlimit.
        let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
        if rc != 0 {
            return Err(ProbeError::Os {
                metric: "fd",
                source: io::Error::last_os_error(),
            });
        }

        let open = std::fs::read_dir("/proc/self/fd")
            .map_err(|source| ProbeError::Os { metric: "fd", source })?
            .count();
        Ok(ratio_percent(open as f64, limit.rlim_cur as f64))
    }
}

#[cfg(not(unix))]
mod os {
    use crate::error::ProbeError;

    fn unsupported(metric: &'static str) -> ProbeError {
        ProbeError::Os {
            metric,
            source: std::io::Error::new(std::io::ErrorKind::Unsupported, "not a unix host"),
        }
    }

    pub fn inode_usage(_path: &str) -> Result<f64, ProbeError> {
        Err(unsupported("inode"))
    }

    pub fn fd_usage() -> Result<f64, ProbeError> {
        Err(unsupported("fd"))
    }
}
