//! CPU utilization from cumulative tick counters.
//!
//! Utilization is the busy share of ticks between two readings of the
//! aggregate `cpu` line. Only one previous reading is kept. When it is
//! missing, or too close or too far in time, the 1-minute load average per
//! core stands in for the delta.

use std::time::{Duration, Instant};

use craftmon_core::MonitorError;
use craftmon_core::types::{CpuMethod, CpuUsage, round2};
use tracing::debug;

use crate::sources::HostSources;

/// Cumulative ticks of the aggregate `cpu` line, in kernel order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CounterSnapshot {
    /// Parse the aggregate line out of a full `stat` file.
    ///
    /// The first four counters are required; older kernels omit the rest,
    /// which then read as 0.
    pub fn parse(stat: &str) -> Result<Self, MonitorError> {
        let line = stat
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| MonitorError::parse("stat", "no aggregate cpu line"))?;

        let mut fields = [0u64; 8];
        let mut seen = 0;
        for (slot, raw) in fields.iter_mut().zip(line.split_whitespace().skip(1)) {
            *slot = raw
                .parse()
                .map_err(|_| MonitorError::parse("stat", format!("bad counter {raw:?}")))?;
            seen += 1;
        }
        if seen < 4 {
            return Err(MonitorError::parse(
                "stat",
                format!("expected at least 4 counters, got {seen}"),
            ));
        }

        let [user, nice, system, idle, iowait, irq, softirq, steal] = fields;
        Ok(Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
        })
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle.saturating_add(self.iowait)
    }

    pub fn total_ticks(&self) -> u64 {
        [self.user, self.nice, self.system, self.irq, self.softirq, self.steal]
            .into_iter()
            .fold(self.idle_ticks(), u64::saturating_add)
    }
}

/// Age range, exclusive at both ends, in which the previous reading is
/// used for a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuWindow {
    pub min: Duration,
    pub max: Duration,
}

impl Default for CpuWindow {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(5000),
        }
    }
}

impl CpuWindow {
    fn contains(&self, elapsed: Duration) -> bool {
        elapsed > self.min && elapsed < self.max
    }
}

#[derive(Debug)]
pub struct CpuEstimator {
    sources: HostSources,
    window: CpuWindow,
    previous: Option<(CounterSnapshot, Instant)>,
}

impl CpuEstimator {
    pub fn new(sources: HostSources, window: CpuWindow) -> Self {
        Self {
            sources,
            window,
            previous: None,
        }
    }

    /// Read the counters and estimate utilization at `now`.
    pub fn cpu_usage(&mut self, now: Instant) -> Result<CpuUsage, MonitorError> {
        let stat = self.sources.read("stat", &self.sources.stat())?;
        let current = CounterSnapshot::parse(&stat)?;
        let cores = self.sources.core_count();
        let sources = self.sources.clone();
        self.estimate(current, now, cores, || sources.load_average())
    }

    /// Estimate from an already-read snapshot. `load_average` is only
    /// called when the delta cannot be used.
    ///
    /// The stored reading is replaced by `current` whichever branch runs.
    pub fn estimate(
        &mut self,
        current: CounterSnapshot,
        now: Instant,
        cores: usize,
        load_average: impl FnOnce() -> Result<f64, MonitorError>,
    ) -> Result<CpuUsage, MonitorError> {
        let previous = self.previous.replace((current, now));
        let usage = match previous {
            Some((prev, at)) if self.window.contains(now.saturating_duration_since(at)) => {
                CpuUsage {
                    percent: delta_percent(&prev, &current),
                    core_count: cores,
                    method: CpuMethod::Delta,
                }
            }
            _ => CpuUsage {
                percent: load_percent(load_average()?, cores),
                core_count: cores,
                method: CpuMethod::LoadAverage,
            },
        };
        debug!(percent = usage.percent, method = ?usage.method, "cpu usage");
        Ok(usage)
    }
}

/// Busy share of the ticks between two readings, 0..=100.
pub fn delta_percent(prev: &CounterSnapshot, current: &CounterSnapshot) -> f64 {
    let total_diff = current.total_ticks() as i128 - prev.total_ticks() as i128;
    let idle_diff = current.idle_ticks() as i128 - prev.idle_ticks() as i128;
    if total_diff <= 0 {
        return 0.0;
    }
    let percent = 100.0 * (total_diff - idle_diff) as f64 / total_diff as f64;
    round2(percent.clamp(0.0, 100.0))
}

/// Load average as a share of the cores, capped at 100.
pub fn load_percent(load_average: f64, cores: usize) -> f64 {
    round2((load_average / cores.max(1) as f64 * 100.0).clamp(0.0, 100.0))
}
