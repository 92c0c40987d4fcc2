//! Game-server process detection via `pgrep -f`.

use std::io::ErrorKind;
use std::process::{Command, Stdio};

use craftmon_core::{ProbeOutcome, ProcessProbe};
use tracing::{debug, warn};

/// Command-line patterns of a running modded server.
pub const DEFAULT_PATTERNS: [&str; 3] = ["forge.*server.jar", "run.sh", "java.*forge"];

/// Runs `pgrep -f <pattern>` for each pattern until one matches.
#[derive(Debug, Clone)]
pub struct PgrepProbe {
    program: String,
    patterns: Vec<String>,
}

impl PgrepProbe {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            program: "pgrep".to_owned(),
            patterns,
        }
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for PgrepProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS.iter().map(|p| (*p).to_owned()).collect())
    }
}

impl ProcessProbe for PgrepProbe {
    fn probe(&self) -> ProbeOutcome {
        for pattern in &self.patterns {
            let status = Command::new(&self.program)
                .args(["-f", pattern])
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(s) if s.success() => {
                    debug!(pattern = %pattern, "server process found");
                    return ProbeOutcome::Running;
                }
                // pgrep exits 1 when nothing matched.
                Ok(s) if s.code() == Some(1) => continue,
                Ok(s) => {
                    warn!(pattern = %pattern, code = ?s.code(), "process probe failed");
                    return ProbeOutcome::Unavailable;
                }
                Err(e) => {
                    if e.kind() == ErrorKind::NotFound {
                        debug!(program = %self.program, "process probe not installed");
                    } else {
                        warn!(program = %self.program, error = %e, "failed to run process probe");
                    }
                    return ProbeOutcome::Unavailable;
                }
            }
        }
        ProbeOutcome::NotRunning
    }
}
