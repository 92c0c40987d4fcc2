//! Process liveness probing seam.

/// Result of asking the host whether the game server process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Running,
    NotRunning,
    /// The probe mechanism itself could not be used (e.g. `pgrep` missing).
    Unavailable,
}

/// Trait for checking the server process. Enables mock injection for testing.
pub trait ProcessProbe: Send + Sync {
    fn probe(&self) -> ProbeOutcome;
}

impl<T: ProcessProbe + ?Sized> ProcessProbe for &T {
    fn probe(&self) -> ProbeOutcome {
        (**self).probe()
    }
}

/// Probe with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub ProbeOutcome);

impl ProcessProbe for FixedProbe {
    fn probe(&self) -> ProbeOutcome {
        self.0
    }
}
