//! craftmon-host: host utilization and process liveness.
//! CPU and memory readings from procfs counter files, and a
//! `pgrep`-backed probe for the game-server process.

pub mod cpu;
pub mod memory;
pub mod process;
pub mod sources;

pub use cpu::{CounterSnapshot, CpuEstimator, CpuWindow};
pub use memory::memory_usage;
pub use process::PgrepProbe;
pub use sources::HostSources;
