//! Component configuration assembled from CLI options.

use std::path::PathBuf;
use std::time::Duration;

use craftmon_core::{FixedProbe, ProbeOutcome, ProcessProbe};
use craftmon_history::HistoryConfig;
use craftmon_host::{CpuWindow, HostSources, PgrepProbe};
use craftmon_source_log::{ReadinessConfig, ResolverConfig, TrackerConfig};

use crate::cli::MonitorOpts;

const STATE_FILE: &str = "player_tracker_state.json";
const PLAYTIME_FILE: &str = "player_playtime.json";

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub tracker: TrackerConfig,
    pub resolver: ResolverConfig,
    pub readiness: ReadinessConfig,
    pub history: HistoryConfig,
    pub cpu_window: CpuWindow,
    pub host: HostSources,
    pub playtime_file: PathBuf,
    pub history_interval: Duration,
    pub process_patterns: Vec<String>,
    pub skip_process_probe: bool,
}

impl MonitorConfig {
    pub fn from_opts(opts: &MonitorOpts) -> Self {
        Self {
            tracker: TrackerConfig {
                log_file: opts.log_file.clone(),
                state_file: opts.data_dir.join(STATE_FILE),
                usercache_max_age: Duration::from_secs(opts.usercache_max_age_secs),
            },
            resolver: ResolverConfig {
                primary: opts.usercache.clone(),
                fallback: opts.usercache_fallback.clone(),
            },
            readiness: ReadinessConfig {
                log_file: opts.log_file.clone(),
                window_bytes: opts.readiness_window_bytes,
                liveness_window: Duration::from_secs(opts.liveness_window_secs),
            },
            history: HistoryConfig {
                dir: opts.data_dir.clone(),
                max_rows: opts.history_max_rows,
            },
            cpu_window: CpuWindow {
                min: Duration::from_millis(opts.cpu_window_min_ms),
                max: Duration::from_millis(opts.cpu_window_max_ms),
            },
            host: HostSources::new(opts.proc_root.clone()),
            playtime_file: opts.data_dir.join(PLAYTIME_FILE),
            history_interval: Duration::from_millis(opts.history_interval_ms),
            process_patterns: opts.process_patterns.clone(),
            skip_process_probe: opts.skip_process_probe,
        }
    }

    /// Probe for the server process. Skipping the probe reports it as
    /// unavailable so readiness falls back to log freshness.
    pub fn process_probe(&self) -> Box<dyn ProcessProbe> {
        if self.skip_process_probe {
            Box::new(FixedProbe(ProbeOutcome::Unavailable))
        } else {
            Box::new(PgrepProbe::new(self.process_patterns.clone()))
        }
    }
}
