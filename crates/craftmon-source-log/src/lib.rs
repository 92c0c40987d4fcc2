//! craftmon-source-log: everything derived from the server's text log.
//! Tails `latest.log`, classifies lines into player events, keeps the
//! per-player session table with its identity resolver, and infers the
//! server's boot phase from the log tail.

pub mod classify;
pub mod readiness;
pub mod resolver;
pub mod tail;
pub mod timestamp;
pub mod tracker;

pub use readiness::{ReadinessConfig, ReadinessInferencer};
pub use resolver::{ResolverConfig, UsernameResolver, synthetic_id};
pub use tail::LogTailReader;
pub use tracker::{Refresh, SessionTracker, TrackerConfig};
