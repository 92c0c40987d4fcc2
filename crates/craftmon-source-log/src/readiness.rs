//! Boot-phase inference from the tail of the server log.
//!
//! The newest "server finished starting" marker is compared with the
//! newest world-preparation marker; whichever came last decides between
//! Ready and Initializing. A restart that reuses the same log file flips
//! the answer back to Initializing.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use craftmon_core::types::{ServerState, ServerStatus};
use craftmon_core::{ProbeOutcome, ProcessProbe};
use tracing::{debug, warn};

use crate::classify::log_message;
use crate::timestamp::extract_timestamp;

/// Message prefixes printed while the world is being prepared.
const INITIALIZING_MARKERS: [&str; 6] = [
    "Preparing start region",
    "Preparing spawn area",
    "Loading spawn chunks",
    "Preparing level",
    "Starting minecraft server version",
    "Time elapsed",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessConfig {
    pub log_file: PathBuf,
    /// Only this many trailing bytes of the log are scanned.
    pub window_bytes: u64,
    /// With no usable process probe, a log modified this recently counts
    /// as a running server.
    pub liveness_window: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("/minecraft/logs/latest.log"),
            window_bytes: 10_000_000,
            liveness_window: Duration::from_secs(60),
        }
    }
}

/// Position of a marker: its timestamp, then its line index to order
/// markers that share a timestamp.
type MarkerPos = (DateTime<Utc>, usize);

#[derive(Debug, Default, PartialEq, Eq)]
struct MarkerScan {
    latest_ready: Option<MarkerPos>,
    latest_initializing: Option<MarkerPos>,
}

#[derive(Debug, Clone)]
pub struct ReadinessInferencer {
    config: ReadinessConfig,
}

impl ReadinessInferencer {
    pub fn new(config: ReadinessConfig) -> Self {
        Self { config }
    }

    /// Current boot phase of the server.
    pub fn status(&self, probe: &dyn ProcessProbe, now: DateTime<Utc>) -> ServerStatus {
        let path = &self.config.log_file;
        let Ok(meta) = fs::metadata(path) else {
            return ServerStatus::new(ServerState::Unknown, "Log file not found");
        };

        let running = match probe.probe() {
            ProbeOutcome::Running => true,
            ProbeOutcome::NotRunning => false,
            ProbeOutcome::Unavailable => meta
                .modified()
                .map(|mtime| {
                    let age = now.signed_duration_since(DateTime::<Utc>::from(mtime));
                    age.to_std().unwrap_or_default() < self.config.liveness_window
                })
                .unwrap_or(false),
        };
        if !running {
            return ServerStatus::new(ServerState::Unknown, "Server process not running");
        }

        let scan = match self.scan(now) {
            Ok(scan) => scan,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to scan log for readiness");
                MarkerScan::default()
            }
        };
        debug!(?scan, "readiness markers");
        decide(&scan)
    }

    fn scan(&self, now: DateTime<Utc>) -> std::io::Result<MarkerScan> {
        let mut file = File::open(&self.config.log_file)?;
        let size = file.metadata()?.len();
        let start = size.saturating_sub(self.config.window_bytes);
        // Seek one byte early to see whether the window opens on a line
        // boundary.
        file.seek(SeekFrom::Start(start.saturating_sub(1)))?;

        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        if start > 0 {
            // Skips just the newline on a boundary, the cut line otherwise.
            reader.read_until(b'\n', &mut buf)?;
        }

        let mut scan = MarkerScan::default();
        let mut index = 0usize;
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            index += 1;
            let line = String::from_utf8_lossy(&buf);
            let Some(message) = log_message(&line) else {
                continue;
            };
            let slot = if is_ready_marker(message) {
                &mut scan.latest_ready
            } else if is_initializing_marker(message) {
                &mut scan.latest_initializing
            } else {
                continue;
            };
            let pos = (extract_timestamp(&line, now), index);
            if slot.is_none_or(|prev| pos > prev) {
                *slot = Some(pos);
            }
        }
        Ok(scan)
    }
}

fn decide(scan: &MarkerScan) -> ServerStatus {
    match (scan.latest_ready, scan.latest_initializing) {
        (Some(ready), init) if init.is_none_or(|init| ready > init) => {
            ServerStatus::new(ServerState::Ready, "Server is ready - players can join!")
        }
        (_, Some(_)) => ServerStatus::new(ServerState::Initializing, "Server is initializing..."),
        // Running with no markers yet: still booting, never Ready by default.
        _ => ServerStatus::new(ServerState::Initializing, "Server is starting up..."),
    }
}

/// `Done (12.345s)! For help, type "help"` and its variants.
fn is_ready_marker(message: &str) -> bool {
    message
        .strip_prefix("Done (")
        .and_then(|rest| rest.find(")!"))
        .is_some()
}

fn is_initializing_marker(message: &str) -> bool {
    INITIALIZING_MARKERS.iter().any(|m| message.starts_with(m))
}
