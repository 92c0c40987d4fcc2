//! craftmon-core: shared domain types for the game-server monitor.
//! Sessions, classified log events, host utilization readings, server
//! readiness, the error taxonomy, and the atomic snapshot writer.

pub mod error;
pub mod persist;
pub mod probe;
pub mod types;

pub use error::MonitorError;
pub use persist::{is_uuid, write_atomic};
pub use probe::{FixedProbe, ProbeOutcome, ProcessProbe};
