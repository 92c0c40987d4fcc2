//! Locations of the host counter files beneath a procfs root.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use craftmon_core::MonitorError;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSources {
    proc_root: PathBuf,
}

impl Default for HostSources {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl HostSources {
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    pub fn proc_root(&self) -> &Path {
        &self.proc_root
    }

    pub fn stat(&self) -> PathBuf {
        self.proc_root.join("stat")
    }

    pub fn meminfo(&self) -> PathBuf {
        self.proc_root.join("meminfo")
    }

    pub fn loadavg(&self) -> PathBuf {
        self.proc_root.join("loadavg")
    }

    pub fn cpuinfo(&self) -> PathBuf {
        self.proc_root.join("cpuinfo")
    }

    /// Read one counter file in full.
    pub fn read(&self, source_name: &'static str, path: &Path) -> Result<String, MonitorError> {
        fs::read_to_string(path).map_err(|e| MonitorError::from_read(source_name, path, e))
    }

    /// 1-minute load average.
    pub fn load_average(&self) -> Result<f64, MonitorError> {
        let content = self.read("loadavg", &self.loadavg())?;
        content
            .split_whitespace()
            .next()
            .and_then(|field| field.parse::<f64>().ok())
            .ok_or_else(|| MonitorError::parse("loadavg", "missing 1-minute load field"))
    }

    /// Logical processors listed in `cpuinfo`. Falls back to the
    /// parallelism the OS reports, and never returns 0.
    pub fn core_count(&self) -> usize {
        let counted = fs::read_to_string(self.cpuinfo())
            .map(|content| count_processors(&content))
            .unwrap_or(0);
        if counted > 0 {
            return counted;
        }
        debug!(proc_root = %self.proc_root.display(), "no processor entries in cpuinfo");
        thread::available_parallelism().map_or(1, |n| n.get())
    }
}

fn count_processors(cpuinfo: &str) -> usize {
    cpuinfo
        .lines()
        .filter(|line| line.starts_with("processor"))
        .count()
}
